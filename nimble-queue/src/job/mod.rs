pub mod registry;

pub use registry::{JobHandler, JobRegistry};

use crate::JobError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// A unit of background work, dispatched by its stable `JOB_TYPE`
#[async_trait]
pub trait Job: Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Shared dependencies handed to every run
    type Context: Send + Sync + Clone + 'static;

    /// Stable name the registry dispatches on
    const JOB_TYPE: &'static str;

    /// Retries this job asks for; the pool may cap it
    const MAX_RETRIES: u32 = 3;

    async fn execute(&self, ctx: Self::Context) -> Result<(), JobError>;

    fn max_retries(&self) -> u32 {
        Self::MAX_RETRIES
    }

    /// Jobs sharing a key are never queued twice at once
    fn idempotency_key(&self) -> Option<String> {
        None
    }
}
