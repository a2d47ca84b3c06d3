use std::sync::Arc;

use anyhow::{bail, Context, Result};
use nimble_axum::BlobApp;
use nimble_blob::{
    AzureBlobStore, AzureConfig, BackendTag, BlobLifecycle, LifecycleStores, MemoryMetadataStore,
    MemoryRemoteStore, MetadataStore, RemoteRegistry, S3CompatibleStore, SqliteMetadataStore,
    StagingStore, UploadBlobJob,
};
use nimble_queue::{JobRegistry, LocalTaskQueue};
use tracing::{info, warn};

use crate::config::{AzureSettings, MetadataBackend, ServerConfig};

/// Everything `main` needs to serve and shut down
pub struct Server {
    pub app: BlobApp,
    pub blobs: Arc<BlobLifecycle>,
    pub queue: Arc<LocalTaskQueue>,
}

pub async fn build(config: &ServerConfig) -> Result<Server> {
    let staging = StagingStore::open(&config.staging_root)
        .await
        .with_context(|| format!("opening staging root {}", config.staging_root.display()))?;
    let metadata = build_metadata(&config.metadata).await?;
    let remotes = build_remotes(config).await?;
    if remotes.is_empty() {
        bail!(
            "no storage backend configured: set azure.account and azure.key, \
             azure.credentials_file, s3.bucket or memory.backends"
        );
    }
    info!(backends = ?remotes.backends(), "Storage backends registered");

    let stores = LifecycleStores::new(staging, metadata, remotes)
        .with_config(config.lifecycle.clone());

    let mut jobs = JobRegistry::new();
    jobs.register::<UploadBlobJob>(stores.clone())?;
    let queue = Arc::new(LocalTaskQueue::start(jobs, config.queue.clone()));

    let blobs = Arc::new(BlobLifecycle::new(stores, queue.clone()));
    let app = BlobApp::new(Arc::clone(&blobs)).with_body_limit(config.max_body_bytes);

    Ok(Server { app, blobs, queue })
}

async fn build_metadata(backend: &MetadataBackend) -> Result<Arc<dyn MetadataStore>> {
    match backend {
        MetadataBackend::Memory => {
            warn!("Using in-memory metadata; records are lost on restart");
            Ok(Arc::new(MemoryMetadataStore::new()))
        }
        MetadataBackend::Sqlite { url } => {
            let opened = if url.starts_with("sqlite:") {
                SqliteMetadataStore::connect(url).await
            } else {
                SqliteMetadataStore::open(url).await
            };
            let store = opened.with_context(|| format!("opening metadata database {url}"))?;
            Ok(Arc::new(store))
        }
    }
}

async fn build_remotes(config: &ServerConfig) -> Result<RemoteRegistry> {
    let mut remotes = RemoteRegistry::new();

    if config.azure.is_configured() {
        let azure = azure_config(&config.azure).await?;
        info!(account = %azure.account, container = %azure.container, "Azure backend enabled");
        remotes.register("azure", Arc::new(AzureBlobStore::new(azure)));
    }

    if let Some(s3) = &config.s3 {
        info!(bucket = %s3.bucket, "S3 backend enabled");
        remotes.register("s3", Arc::new(S3CompatibleStore::new(s3.clone()).await));
    }

    if !config.memory_backends.is_empty() {
        let memory = Arc::new(MemoryRemoteStore::new());
        for tag in &config.memory_backends {
            if remotes.supports(&BackendTag::new(tag)) {
                warn!(backend = %tag, "Backend already registered, not replacing it with memory");
                continue;
            }
            warn!(backend = %tag, "Serving backend from memory; objects are lost on restart");
            remotes.register(tag, memory.clone());
        }
    }

    Ok(remotes)
}

async fn azure_config(settings: &AzureSettings) -> Result<AzureConfig> {
    let config = match (&settings.account, &settings.key, &settings.credentials_file) {
        (Some(account), Some(key), _) => AzureConfig::new(account, key),
        (_, _, Some(path)) => AzureConfig::from_credentials_file(path)
            .await
            .with_context(|| format!("reading Azure credentials from {}", path.display()))?,
        _ => bail!("azure.account and azure.key, or azure.credentials_file, are required"),
    };
    Ok(config.with_container(settings.container.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigMap;

    fn config_in(dir: &tempfile::TempDir, pairs: &[(&str, &str)]) -> ServerConfig {
        let mut map = ConfigMap::with_defaults();
        map.set("staging.root", dir.path().join("staging").display().to_string());
        map.set("metadata.url", "memory");
        for (key, value) in pairs {
            map.set(*key, *value);
        }
        ServerConfig::from_map(&map).unwrap()
    }

    #[tokio::test]
    async fn refuses_to_start_without_backends() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, &[]);

        let err = build(&config).await.err().unwrap();
        assert!(err.to_string().contains("no storage backend"));
    }

    #[tokio::test]
    async fn memory_backends_are_registered() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, &[("memory.backends", "azure,local")]);

        let server = build(&config).await.unwrap();
        assert_eq!(
            server.blobs.stores().remotes().backends(),
            vec!["azure".to_string(), "local".to_string()]
        );

        server
            .blobs
            .save("x", "local", bytes_of("1"))
            .await
            .unwrap();
        server.queue.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn sqlite_metadata_is_opened_from_a_path() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("meta").join("nimble.db");
        let config = config_in(
            &dir,
            &[
                ("memory.backends", "azure"),
                ("metadata.url", db.to_str().unwrap()),
            ],
        );

        let server = build(&config).await.unwrap();
        server.queue.shutdown().await.unwrap();
        assert!(db.exists());
    }

    #[tokio::test]
    async fn azure_credentials_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"account_name":"acme","account_key":"c2VjcmV0"}"#).unwrap();

        let settings = AzureSettings {
            credentials_file: Some(path),
            container: "media".to_string(),
            ..Default::default()
        };
        let azure = azure_config(&settings).await.unwrap();
        assert_eq!(azure.account, "acme");
        assert_eq!(azure.container, "media");
    }

    fn bytes_of(s: &'static str) -> bytes::Bytes {
        bytes::Bytes::from_static(s.as_bytes())
    }
}
