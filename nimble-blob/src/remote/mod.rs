//! Remote object stores and the registry that selects them by backend tag.

mod memory;
#[cfg(feature = "azure")]
mod azure;
#[cfg(feature = "s3")]
mod s3;

pub use memory::MemoryRemoteStore;
#[cfg(feature = "azure")]
pub use azure::{AzureBlobStore, AzureConfig, DEFAULT_CONTAINER};
#[cfg(feature = "s3")]
pub use s3::{S3CompatibleStore, S3Config};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{BackendTag, BlobError, BlobResult};

/// A durable remote store, addressed by object name inside one container
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Human-readable identity for logs, e.g. `azure:container`
    fn describe(&self) -> String;

    /// Copy the file at `source` to the remote object `name`
    ///
    /// Any service or I/O failure is `UploadFailed`.
    async fn upload(&self, name: &str, source: &Path) -> BlobResult<()>;

    /// Download the whole object; `NotFound` if the store has no such object
    async fn fetch(&self, name: &str) -> BlobResult<Bytes>;
}

/// Remote stores keyed by normalized backend tag
#[derive(Clone, Default)]
pub struct RemoteRegistry {
    stores: BTreeMap<String, Arc<dyn RemoteStore>>,
}

impl RemoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` under `tag`; a later registration for the same tag wins
    pub fn register(&mut self, tag: &str, store: Arc<dyn RemoteStore>) -> &mut Self {
        self.stores.insert(BackendTag::new(tag).as_str().to_string(), store);
        self
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, tag: &str, store: Arc<dyn RemoteStore>) -> Self {
        self.register(tag, store);
        self
    }

    pub fn resolve(&self, tag: &BackendTag) -> BlobResult<Arc<dyn RemoteStore>> {
        self.stores
            .get(tag.as_str())
            .cloned()
            .ok_or_else(|| BlobError::unsupported_backend(tag.as_str()))
    }

    pub fn supports(&self, tag: &BackendTag) -> bool {
        self.stores.contains_key(tag.as_str())
    }

    /// Registered tags, sorted
    pub fn backends(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl std::fmt::Debug for RemoteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.stores.iter().map(|(tag, store)| (tag, store.describe())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_resolve_case_insensitively() {
        let registry = RemoteRegistry::new().with("Azure", Arc::new(MemoryRemoteStore::new()));

        assert!(registry.supports(&BackendTag::new("azure")));
        assert!(registry.resolve(&BackendTag::new(" AZURE ")).is_ok());
        assert_eq!(registry.backends(), vec!["azure".to_string()]);
    }

    #[test]
    fn unknown_tags_are_unsupported() {
        let registry = RemoteRegistry::new().with("azure", Arc::new(MemoryRemoteStore::new()));

        match registry.resolve(&BackendTag::new("dropbox")) {
            Err(BlobError::UnsupportedBackend { backend }) => assert_eq!(backend, "dropbox"),
            other => panic!("unexpected {:?}", other.map(|s| s.describe())),
        }
    }
}
