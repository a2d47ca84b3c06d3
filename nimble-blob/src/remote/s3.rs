use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream as AwsByteStream, Client};
use bytes::Bytes;
use tracing::debug;

use super::RemoteStore;
use crate::{BlobError, BlobResult};

/// Connection settings for an S3-compatible bucket
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom endpoint for MinIO, RustFS and similar services
    pub endpoint_url: Option<String>,
    /// Path-style addressing, required by most self-hosted services
    pub force_path_style: bool,
}

/// Remote store backed by an S3-compatible bucket
#[derive(Clone)]
pub struct S3CompatibleStore {
    client: Client,
    bucket: String,
}

impl S3CompatibleStore {
    pub async fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "nimble",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);
        if let Some(endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.force_path_style)
                .build(),
        );

        Self {
            client,
            bucket: config.bucket,
        }
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl RemoteStore for S3CompatibleStore {
    fn describe(&self) -> String {
        format!("s3:{}", self.bucket)
    }

    async fn upload(&self, name: &str, source: &Path) -> BlobResult<()> {
        // Streams from disk instead of buffering the payload
        let body = AwsByteStream::from_path(source)
            .await
            .map_err(|e| BlobError::upload_failed(name, e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .content_type("application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| BlobError::upload_failed(name, e.into_service_error()))?;

        debug!(object = name, bucket = %self.bucket, "Uploaded object to S3");
        Ok(())
    }

    async fn fetch(&self, name: &str) -> BlobResult<Bytes> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                if err.is_no_such_key() {
                    return Err(BlobError::not_found(name));
                }
                return Err(BlobError::backend(err));
            }
        };

        let body = output.body.collect().await.map_err(BlobError::backend)?;
        Ok(body.into_bytes())
    }
}
