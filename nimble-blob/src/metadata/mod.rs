//! Durable record of every known object and its upload state.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryMetadataStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMetadataStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{BlobRecord, BlobResult, UploadClaim, UploadToken};

/// Metadata persistence consumed by the lifecycle
///
/// `create` must be atomic per name: of two concurrent creates for the same
/// name exactly one succeeds and the other fails with `Conflict`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn exists(&self, name: &str) -> BlobResult<bool>;

    /// Insert a pending record (`uploaded = false`)
    async fn create(&self, name: &str, backend: &str) -> BlobResult<BlobRecord>;

    async fn get(&self, name: &str) -> BlobResult<BlobRecord>;

    /// Flip `uploaded` to true and drop any lease; idempotent
    async fn mark_uploaded(&self, name: &str) -> BlobResult<()>;

    /// Take the upload lease if the object is pending and no live lease exists
    async fn claim_upload(
        &self,
        name: &str,
        token: &UploadToken,
        lease_until: DateTime<Utc>,
    ) -> BlobResult<UploadClaim>;

    /// Drop the lease if it is still held by `token`
    async fn release_upload(&self, name: &str, token: &UploadToken) -> BlobResult<()>;

    /// Records not yet uploaded, oldest first
    async fn list_pending(&self) -> BlobResult<Vec<BlobRecord>>;
}
