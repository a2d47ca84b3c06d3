use std::path::Path;

use async_trait::async_trait;
use azure_core::error::ErrorKind as AzureErrorKind;
use azure_core::StatusCode;
use azure_storage::StorageCredentials;
use azure_storage_blobs::prelude::{ClientBuilder, ContainerClient};
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use super::RemoteStore;
use crate::{BlobError, BlobResult};

/// Container used when none is configured
pub const DEFAULT_CONTAINER: &str = "container";

/// Azure storage account credentials and target container
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub account: String,
    pub access_key: String,
    pub container: String,
}

/// Shape of a `credentials.json` file
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    account_name: String,
    account_key: String,
}

impl AzureConfig {
    pub fn new(account: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            access_key: access_key.into(),
            container: DEFAULT_CONTAINER.to_string(),
        }
    }

    /// Read `{ "account_name": ..., "account_key": ... }` from a JSON file
    pub async fn from_credentials_file(path: impl AsRef<Path>) -> BlobResult<Self> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        let creds: CredentialsFile = serde_json::from_slice(&raw)?;
        Ok(Self::new(creds.account_name, creds.account_key))
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }
}

/// Remote store backed by an Azure Blob Storage container
#[derive(Clone)]
pub struct AzureBlobStore {
    container: ContainerClient,
    container_name: String,
}

impl AzureBlobStore {
    pub fn new(config: AzureConfig) -> Self {
        let credentials = StorageCredentials::access_key(config.account.clone(), config.access_key);
        let container =
            ClientBuilder::new(config.account, credentials).container_client(config.container.clone());

        Self {
            container,
            container_name: config.container,
        }
    }
}

fn is_not_found(err: &azure_core::Error) -> bool {
    matches!(
        err.kind(),
        AzureErrorKind::HttpResponse { status, .. } if *status == StatusCode::NotFound
    )
}

#[async_trait]
impl RemoteStore for AzureBlobStore {
    fn describe(&self) -> String {
        format!("azure:{}", self.container_name)
    }

    async fn upload(&self, name: &str, source: &Path) -> BlobResult<()> {
        let data = tokio::fs::read(source)
            .await
            .map_err(|e| BlobError::upload_failed(name, e))?;
        let size = data.len();

        self.container
            .blob_client(name)
            .put_block_blob(Bytes::from(data))
            .content_type("application/octet-stream")
            .await
            .map_err(|e| BlobError::upload_failed(name, e))?;

        debug!(object = name, container = %self.container_name, size, "Uploaded block blob");
        Ok(())
    }

    async fn fetch(&self, name: &str) -> BlobResult<Bytes> {
        match self.container.blob_client(name).get_content().await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if is_not_found(&err) => Err(BlobError::not_found(name)),
            Err(err) => Err(BlobError::backend(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn credentials_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, br#"{"account_name":"acct","account_key":"a2V5"}"#)
            .await
            .unwrap();

        let config = AzureConfig::from_credentials_file(&path).await.unwrap();
        assert_eq!(config.account, "acct");
        assert_eq!(config.access_key, "a2V5");
        assert_eq!(config.container, DEFAULT_CONTAINER);
    }

    #[tokio::test]
    async fn malformed_credentials_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, br#"{"account_name":"acct"}"#).await.unwrap();

        let err = AzureConfig::from_credentials_file(&path).await.unwrap_err();
        assert!(matches!(err, BlobError::Serialization { .. }));
    }
}
