//! # nimble-blob: staged blob lifecycle
//!
//! Objects are written to local staging first, recorded as pending, and
//! moved to a remote object store by a background job. Reads work at every
//! point of that journey.
//!
//! ## Key Features
//!
//! - **Unique names**: a name is accepted once; duplicates are `Conflict`
//! - **Always readable**: staging serves pending objects, the remote store
//!   serves uploaded ones
//! - **Pluggable remotes**: Azure Blob Storage, S3-compatible buckets and an
//!   in-memory store, selected by backend tag through [`RemoteRegistry`]
//! - **Safe re-runs**: uploads are fenced by a persisted lease, so duplicate
//!   deliveries of the same job step aside
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  BlobLifecycle   │  ← save / read / status / resume
//! ├──────────────────┤
//! │  UploadBlobJob   │  ← background unit, run by nimble-queue
//! ├────────┬─────────┼──────────────┐
//! │Staging │Metadata │RemoteRegistry│
//! └────────┴─────────┴──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nimble_blob::prelude::*;
//! use nimble_queue::{JobRegistry, LocalTaskQueue, QueueConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let staging = StagingStore::open("./temp_storage").await?;
//! let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
//! let remotes = RemoteRegistry::new().with("azure", Arc::new(MemoryRemoteStore::new()));
//! let stores = LifecycleStores::new(staging, metadata, remotes);
//!
//! let mut jobs = JobRegistry::new();
//! jobs.register::<UploadBlobJob>(stores.clone())?;
//! let queue = Arc::new(LocalTaskQueue::start(jobs, QueueConfig::default()));
//!
//! let blobs = BlobLifecycle::new(stores, queue);
//! blobs.save("report.bin", "azure", bytes::Bytes::from_static(b"ABC")).await?;
//! assert_eq!(&blobs.read("report.bin").await?[..], b"ABC");
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod lifecycle;
pub mod metadata;
mod record;
pub mod remote;
mod staging;
mod types;
mod upload;

pub use config::LifecycleConfig;
pub use error::{BlobError, BlobResult, Stage};
pub use lifecycle::{BlobLifecycle, BlobOrigin, LifecycleStores, OpenedBlob};
pub use metadata::{MemoryMetadataStore, MetadataStore};
#[cfg(feature = "sqlite")]
pub use metadata::SqliteMetadataStore;
pub use record::{BlobRecord, UploadClaim, UploadLease};
pub use remote::{MemoryRemoteStore, RemoteRegistry, RemoteStore};
#[cfg(feature = "azure")]
pub use remote::{AzureBlobStore, AzureConfig};
#[cfg(feature = "s3")]
pub use remote::{S3CompatibleStore, S3Config};
pub use staging::StagingStore;
pub use types::{BackendTag, ObjectName, UploadToken, MAX_NAME_LEN};
pub use upload::{UploadBlobJob, UploadOutcome, UPLOAD_JOB_TYPE};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobError, BlobLifecycle, BlobOrigin, BlobRecord, BlobResult, LifecycleStores,
        MemoryMetadataStore, MemoryRemoteStore, MetadataStore, RemoteRegistry, RemoteStore,
        StagingStore, UploadBlobJob, UploadOutcome,
    };
}
