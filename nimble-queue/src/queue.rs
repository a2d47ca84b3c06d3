use async_trait::async_trait;

use crate::{Job, JobId, JobMessage, QueueResult};

/// Fire-and-forget submission of background work
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Submit a message; returns as soon as it is queued
    async fn enqueue(&self, message: JobMessage) -> QueueResult<JobId>;
}

/// Encode a typed job and submit it
pub async fn enqueue_job<J: Job>(queue: &dyn TaskQueue, job: &J) -> QueueResult<JobId> {
    let message = JobMessage::from_job(job)?;
    queue.enqueue(message).await
}
