//! # nimble-queue
//!
//! Background job runner used by the blob lifecycle manager.
//!
//! - **Typed jobs**: a [`Job`] carries its own payload and names a stable
//!   `JOB_TYPE`; the runner dispatches by that string and a JSON payload
//! - **Fire-and-forget**: callers see only [`TaskQueue::enqueue`]
//! - **Bounded retries**: [`JobError::Retryable`] failures are re-run with
//!   exponential backoff, [`JobError::Permanent`] ones are not
//! - **Idempotent enqueue**: a job with an idempotency key that is already
//!   queued or running is not queued twice
//!
//! ```rust,no_run
//! use nimble_queue::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping { target: String }
//!
//! #[async_trait::async_trait]
//! impl Job for Ping {
//!     type Context = ();
//!     const JOB_TYPE: &'static str = "ping";
//!
//!     async fn execute(&self, _ctx: ()) -> Result<(), JobError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> QueueResult<()> {
//! let mut registry = JobRegistry::new();
//! registry.register::<Ping>(())?;
//!
//! let queue = LocalTaskQueue::start(registry, QueueConfig::default());
//! enqueue_job(&queue, &Ping { target: "db".into() }).await?;
//! queue.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod queue;
pub mod types;
pub mod worker;

pub use config::QueueConfig;
pub use error::{JobError, QueueError, QueueResult};
pub use job::{Job, JobHandler, JobRegistry};
pub use queue::{enqueue_job, TaskQueue};
pub use types::{JobEnvelope, JobEvent, JobId, JobMessage};
pub use worker::LocalTaskQueue;

pub mod prelude {
    pub use crate::{
        enqueue_job, Job, JobError, JobEvent, JobId, JobMessage, JobRegistry, LocalTaskQueue,
        QueueConfig, QueueError, QueueResult, TaskQueue,
    };
}
