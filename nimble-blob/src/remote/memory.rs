use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::RemoteStore;
use crate::{BlobError, BlobResult};

/// In-process remote store
///
/// Used by tests and for local development. Upload failures can be injected
/// with [`fail_next_uploads`](Self::fail_next_uploads).
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    objects: RwLock<HashMap<String, Bytes>>,
    failures_left: AtomicUsize,
    uploads: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` uploads fail
    pub fn fail_next_uploads(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Successful uploads so far
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.read().contains_key(name)
    }

    /// Drop an object behind the metadata's back
    pub fn remove(&self, name: &str) -> Option<Bytes> {
        self.objects.write().remove(name)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn upload(&self, name: &str, source: &Path) -> BlobResult<()> {
        if self.take_failure() {
            return Err(BlobError::upload_failed(name, "injected failure"));
        }

        let data = tokio::fs::read(source)
            .await
            .map_err(|e| BlobError::upload_failed(name, e))?;

        self.objects.write().insert(name.to_string(), Bytes::from(data));
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch(&self, name: &str) -> BlobResult<Bytes> {
        self.objects
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BlobError::not_found(name))
    }
}
