use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use nimble_queue::{enqueue_job, TaskQueue};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    BackendTag, BlobError, BlobRecord, BlobResult, LifecycleConfig, MetadataStore, ObjectName,
    RemoteRegistry, Stage, StagingStore, UploadBlobJob, UploadOutcome,
};

/// The stores an object moves through, shared by the lifecycle and its
/// upload jobs
#[derive(Clone)]
pub struct LifecycleStores {
    pub(crate) staging: StagingStore,
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) remotes: Arc<RemoteRegistry>,
    pub(crate) config: LifecycleConfig,
}

impl LifecycleStores {
    pub fn new(
        staging: StagingStore,
        metadata: Arc<dyn MetadataStore>,
        remotes: RemoteRegistry,
    ) -> Self {
        Self {
            staging,
            metadata,
            remotes: Arc::new(remotes),
            config: LifecycleConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn remotes(&self) -> &RemoteRegistry {
        &self.remotes
    }
}

/// Which stage served a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobOrigin {
    Staging,
    Remote,
}

/// Result of [`BlobLifecycle::open`]
#[derive(Debug, Clone)]
pub struct OpenedBlob {
    pub record: BlobRecord,
    pub origin: BlobOrigin,
    pub content: Bytes,
}

/// Save/read front door of the blob lifecycle
///
/// `save` stages the bytes, records the object as pending and schedules its
/// upload; `read` serves from staging or from the remote store depending on
/// the recorded state. The order remote write, then flag flip, then staging
/// delete means an object is always reachable from at least one stage.
pub struct BlobLifecycle {
    stores: LifecycleStores,
    queue: Arc<dyn TaskQueue>,
    /// Names with a save in flight in this process
    reservations: Mutex<HashSet<String>>,
}

/// Releases an in-process name reservation on drop
struct Reservation<'a> {
    names: &'a Mutex<HashSet<String>>,
    name: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.names.lock().remove(&self.name);
    }
}

impl BlobLifecycle {
    pub fn new(stores: LifecycleStores, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            stores,
            queue,
            reservations: Mutex::new(HashSet::new()),
        }
    }

    pub fn stores(&self) -> &LifecycleStores {
        &self.stores
    }

    /// Stage a new object and schedule its upload
    ///
    /// Returns once the bytes are on local disk and the record exists; the
    /// upload outcome is not observable from here.
    #[instrument(skip(self, bytes), fields(object = %name, backend = %backend, size = bytes.len()))]
    pub async fn save(&self, name: &str, backend: &str, bytes: Bytes) -> BlobResult<BlobRecord> {
        let name = ObjectName::parse(name)?;
        let tag = BackendTag::new(backend);
        self.stores.remotes.resolve(&tag)?;

        let _reservation = self.reserve(&name)?;
        if self.stores.metadata.exists(name.as_str()).await? {
            return Err(BlobError::conflict(name.as_str()));
        }

        // Publishing is exclusive: a concurrent saver elsewhere gets Conflict
        // here and the staged file, if any, belongs to us from now on
        self.stores.staging.save(&name, &bytes).await?;

        let record = match self.stores.metadata.create(name.as_str(), tag.as_str()).await {
            Ok(record) => record,
            Err(err) => {
                if matches!(err, BlobError::Conflict { .. }) {
                    warn!("Name was claimed concurrently");
                }
                if let Err(cleanup) = self.stores.staging.delete(&name).await {
                    warn!(error = %cleanup, "Could not remove orphaned staged payload");
                }
                return Err(err);
            }
        };

        self.schedule_upload(&name).await;
        info!("Object staged");
        Ok(record)
    }

    /// Read the full payload of an object
    pub async fn read(&self, name: &str) -> BlobResult<Bytes> {
        Ok(self.open(name).await?.content)
    }

    /// Read an object along with its record and the stage that served it
    #[instrument(skip(self), fields(object = %name))]
    pub async fn open(&self, name: &str) -> BlobResult<OpenedBlob> {
        let name = ObjectName::parse(name)?;
        let record = self.stores.metadata.get(name.as_str()).await?;

        if record.uploaded {
            return self.fetch_remote(&name, record).await;
        }

        match self.stores.staging.read(&name).await {
            Ok(content) => Ok(OpenedBlob {
                record,
                origin: BlobOrigin::Staging,
                content,
            }),
            Err(err) if err.is_not_found() => {
                // The upload may have finished between the two reads
                let record = self.stores.metadata.get(name.as_str()).await?;
                if record.uploaded {
                    debug!("Upload completed during read, serving remote copy");
                    return self.fetch_remote(&name, record).await;
                }
                error!("Pending object has no staged payload");
                Err(BlobError::inconsistent(name.as_str(), Stage::Staging))
            }
            Err(err) => Err(err),
        }
    }

    /// Current metadata of an object
    pub async fn status(&self, name: &str) -> BlobResult<BlobRecord> {
        let name = ObjectName::parse(name)?;
        self.stores.metadata.get(name.as_str()).await
    }

    /// Run the upload unit for `name` inline
    pub async fn run_upload(&self, name: &str) -> BlobResult<UploadOutcome> {
        let name = ObjectName::parse(name)?;
        self.stores.run_upload(&name).await
    }

    /// Re-schedule uploads for every pending object; returns how many were
    /// queued
    pub async fn resume_pending(&self) -> BlobResult<usize> {
        let pending = self.stores.metadata.list_pending().await?;
        let mut queued = 0;

        for record in pending {
            let name = match ObjectName::parse(record.name.as_str()) {
                Ok(name) => name,
                Err(err) => {
                    warn!(object = %record.name, error = %err, "Skipping record with unusable name");
                    continue;
                }
            };
            if self.schedule_upload(&name).await {
                queued += 1;
            }
        }

        if queued > 0 {
            info!(queued, "Resumed pending uploads");
        }
        Ok(queued)
    }

    fn reserve(&self, name: &ObjectName) -> BlobResult<Reservation<'_>> {
        let mut names = self.reservations.lock();
        if !names.insert(name.as_str().to_string()) {
            return Err(BlobError::conflict(name.as_str()));
        }
        Ok(Reservation {
            names: &self.reservations,
            name: name.as_str().to_string(),
        })
    }

    async fn schedule_upload(&self, name: &ObjectName) -> bool {
        match enqueue_job(self.queue.as_ref(), &UploadBlobJob::new(name)).await {
            Ok(job_id) => {
                debug!(object = %name, %job_id, "Upload scheduled");
                true
            }
            Err(err) => {
                // Record stays pending; resume_pending picks it up
                warn!(object = %name, error = %err, "Could not schedule upload");
                false
            }
        }
    }

    async fn fetch_remote(&self, name: &ObjectName, record: BlobRecord) -> BlobResult<OpenedBlob> {
        let remote = self.stores.remotes.resolve(&BackendTag::new(&record.backend))?;

        match remote.fetch(name.as_str()).await {
            Ok(content) => Ok(OpenedBlob {
                record,
                origin: BlobOrigin::Remote,
                content,
            }),
            Err(err) if err.is_not_found() => {
                error!(remote = %remote.describe(), "Uploaded object is missing from its remote store");
                Err(BlobError::inconsistent(name.as_str(), Stage::Remote))
            }
            Err(err) => Err(err),
        }
    }
}
