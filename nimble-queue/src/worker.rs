use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    JobEnvelope, JobEvent, JobId, JobMessage, JobRegistry, QueueConfig, QueueError, QueueResult,
    TaskQueue,
};

/// State shared between the queue handle and its workers
struct Shared {
    registry: JobRegistry,
    config: QueueConfig,
    sender: mpsc::UnboundedSender<JobEnvelope>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<JobEnvelope>>,
    /// dedup key -> live job
    inflight: Mutex<HashMap<String, JobId>>,
    events: broadcast::Sender<JobEvent>,
}

impl Shared {
    fn publish(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn settle(&self, message: &JobMessage) {
        if let Some(key) = message.dedup_key() {
            self.inflight.lock().remove(&key);
        }
    }
}

/// In-process task queue backed by a pool of tokio workers
///
/// Jobs are dispatched through a [`JobRegistry`] by job type. Retryable
/// failures are re-queued with exponential backoff until the retry budget
/// (the smaller of the job's and the pool's) is spent.
pub struct LocalTaskQueue {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl LocalTaskQueue {
    /// Spawn the workers and return the queue handle
    pub fn start(registry: JobRegistry, config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            registry,
            config: config.clone(),
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            inflight: Mutex::new(HashMap::new()),
            events,
        });

        let workers = (0..config.max_workers.max(1))
            .map(|index| {
                let shared = Arc::clone(&shared);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(run_worker(index, shared, shutdown_rx))
            })
            .collect();

        info!(
            workers = config.max_workers,
            job_types = ?shared.registry.registered_types(),
            "Task queue started"
        );

        Self {
            shared,
            shutdown_tx,
            workers: Mutex::new(workers),
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribe to job lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    /// Number of jobs with an idempotency key that are queued or running
    pub fn inflight(&self) -> usize {
        self.shared.inflight.lock().len()
    }

    /// Stop accepting work, let running jobs finish and join the workers
    pub async fn shutdown(&self) -> QueueResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            handle
                .await
                .map_err(|e| QueueError::Internal(format!("Worker join error: {}", e)))?;
        }

        info!("Task queue stopped");
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    async fn enqueue(&self, message: JobMessage) -> QueueResult<JobId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::WorkerShutdown);
        }

        let job_id = match message.dedup_key() {
            Some(key) => {
                let mut inflight = self.shared.inflight.lock();
                if let Some(existing) = inflight.get(&key) {
                    debug!(job_id = %existing, key = %key, "Duplicate job collapsed onto live job");
                    return Ok(existing.clone());
                }
                let job_id = JobId::new();
                inflight.insert(key, job_id.clone());
                job_id
            }
            None => JobId::new(),
        };

        let job_type = message.job_type.clone();
        let envelope = JobEnvelope {
            job_id: job_id.clone(),
            message,
            attempt: 1,
        };

        if let Err(mpsc::error::SendError(envelope)) = self.shared.sender.send(envelope) {
            self.shared.settle(&envelope.message);
            return Err(QueueError::WorkerShutdown);
        }

        self.shared.publish(JobEvent::Enqueued {
            job_id: job_id.clone(),
            job_type,
            at: Utc::now(),
        });
        Ok(job_id)
    }
}

async fn run_worker(index: usize, shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    debug!(worker = index, "Worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => None,
            envelope = async { shared.receiver.lock().await.recv().await } => envelope,
        };

        let Some(envelope) = next else {
            break;
        };

        process(&shared, envelope).await;
    }

    debug!(worker = index, "Worker stopped");
}

#[instrument(
    skip(shared, envelope),
    fields(
        job_id = %envelope.job_id,
        job_type = %envelope.message.job_type,
        attempt = envelope.attempt
    )
)]
async fn process(shared: &Arc<Shared>, envelope: JobEnvelope) {
    shared.publish(JobEvent::Started {
        job_id: envelope.job_id.clone(),
        attempt: envelope.attempt,
        at: Utc::now(),
    });

    match shared.registry.execute_job(&envelope.message).await {
        Ok(()) => {
            shared.settle(&envelope.message);
            shared.publish(JobEvent::Completed {
                job_id: envelope.job_id.clone(),
                at: Utc::now(),
            });
            info!("Job completed");
        }
        Err(job_error) => {
            let budget = envelope.message.max_retries.min(shared.config.max_retries);
            if job_error.is_retryable() && envelope.attempt <= budget {
                let delay = shared.config.retry_delay(envelope.attempt);
                let retry_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                warn!(error = %job_error, ?delay, "Job failed, will retry");

                shared.publish(JobEvent::Retrying {
                    job_id: envelope.job_id.clone(),
                    retry_at,
                    error: job_error.to_string(),
                    at: Utc::now(),
                });

                let mut retry = envelope;
                retry.attempt += 1;

                let shared = Arc::clone(shared);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(mpsc::error::SendError(dropped)) = shared.sender.send(retry) {
                        shared.settle(&dropped.message);
                    }
                });
            } else {
                shared.settle(&envelope.message);
                shared.publish(JobEvent::Failed {
                    job_id: envelope.job_id.clone(),
                    error: job_error.to_string(),
                    at: Utc::now(),
                });
                error!(error = %job_error, "Job failed permanently");
            }
        }
    }
}
