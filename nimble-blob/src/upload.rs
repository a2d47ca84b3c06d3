use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nimble_queue::{Job, JobError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::lifecycle::LifecycleStores;
use crate::{
    BackendTag, BlobError, BlobRecord, BlobResult, ObjectName, Stage, UploadClaim, UploadToken,
};

/// Stable job type of the upload unit
pub const UPLOAD_JOB_TYPE: &str = "upload_blob";

/// What a run of the upload unit did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    /// Nothing to do; a previous run already finished
    AlreadyUploaded,
    /// Another run holds the lease; this one stepped aside
    InProgress { lease_until: DateTime<Utc> },
}

impl LifecycleStores {
    /// Move one staged object to its remote store
    ///
    /// Safe to run any number of times, concurrently or not: the lease
    /// fences concurrent runs and a finished object is left alone.
    #[instrument(skip(self), fields(object = %name))]
    pub async fn run_upload(&self, name: &ObjectName) -> BlobResult<UploadOutcome> {
        let record = self.metadata.get(name.as_str()).await?;
        if record.uploaded {
            self.discard_staged(name).await;
            return Ok(UploadOutcome::AlreadyUploaded);
        }

        let token = UploadToken::new();
        let lease_until = Utc::now() + self.config.lease_delta();
        match self
            .metadata
            .claim_upload(name.as_str(), &token, lease_until)
            .await?
        {
            UploadClaim::Acquired => {}
            UploadClaim::AlreadyUploaded => {
                self.discard_staged(name).await;
                return Ok(UploadOutcome::AlreadyUploaded);
            }
            UploadClaim::Held { lease_until } => {
                info!(%lease_until, "Upload already in progress, skipping");
                return Ok(UploadOutcome::InProgress { lease_until });
            }
        }

        if let Err(err) = self.transfer(name, &record).await {
            if let Err(release_err) = self.metadata.release_upload(name.as_str(), &token).await {
                warn!(error = %release_err, "Could not release upload lease");
            }
            return Err(err);
        }

        // Remote copy is durable and flagged; the staged copy is now redundant
        if let Err(err) = self.staging.delete(name).await {
            warn!(error = %err, "Uploaded, but the staged copy could not be removed");
        }

        info!(backend = %record.backend, "Object uploaded");
        Ok(UploadOutcome::Uploaded)
    }

    async fn transfer(&self, name: &ObjectName, record: &BlobRecord) -> BlobResult<()> {
        if !self.staging.contains(name).await? {
            error!("Pending object has no staged payload");
            return Err(BlobError::inconsistent(name.as_str(), Stage::Staging));
        }

        let remote = self.remotes.resolve(&BackendTag::new(&record.backend))?;
        remote.upload(name.as_str(), &self.staging.path(name)).await?;
        self.metadata.mark_uploaded(name.as_str()).await
    }

    async fn discard_staged(&self, name: &ObjectName) {
        match self.staging.delete(name).await {
            Ok(()) => info!("Removed leftover staged copy of an uploaded object"),
            Err(err) if err.is_not_found() => {}
            Err(err) => warn!(error = %err, "Could not remove leftover staged copy"),
        }
    }
}

/// Background job wrapping [`LifecycleStores::run_upload`]
///
/// Payload is `{"name": "<object name>"}`; the name doubles as the
/// idempotency key so one object never has two queued uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadBlobJob {
    pub name: String,
}

impl UploadBlobJob {
    pub fn new(name: &ObjectName) -> Self {
        Self {
            name: name.as_str().to_string(),
        }
    }
}

#[async_trait]
impl Job for UploadBlobJob {
    type Context = LifecycleStores;

    const JOB_TYPE: &'static str = UPLOAD_JOB_TYPE;
    const MAX_RETRIES: u32 = 5;

    async fn execute(&self, stores: Self::Context) -> Result<(), JobError> {
        let name = ObjectName::parse(self.name.as_str())
            .map_err(|e| JobError::permanent(e.to_string()))?;

        match stores.run_upload(&name).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_retryable() => {
                warn!(object = %name, error = %err, "Upload attempt failed");
                Err(JobError::retryable(err.to_string()))
            }
            Err(err) => {
                error!(object = %name, error = %err, "Upload cannot proceed");
                Err(JobError::permanent(err.to_string()))
            }
        }
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(self.name.clone())
    }
}
