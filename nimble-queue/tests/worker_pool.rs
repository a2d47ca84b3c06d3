use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nimble_queue::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};

fn fast_config() -> QueueConfig {
    QueueConfig::default()
        .with_max_workers(2)
        .with_backoff(Duration::from_millis(5), Duration::from_millis(20))
}

async fn wait_terminal(events: &mut broadcast::Receiver<JobEvent>, job_id: &JobId) -> JobEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if event.job_id() == job_id && event.is_terminal() {
                return event;
            }
        }
    })
    .await
    .expect("job did not finish in time")
}

#[derive(Serialize, Deserialize)]
struct FlakyJob {
    fail_times: u32,
    permanent: bool,
}

#[async_trait]
impl Job for FlakyJob {
    type Context = Arc<AtomicU32>;

    const JOB_TYPE: &'static str = "flaky";
    const MAX_RETRIES: u32 = 2;

    async fn execute(&self, runs: Self::Context) -> Result<(), JobError> {
        let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
        if run <= self.fail_times {
            if self.permanent {
                return Err(JobError::permanent(format!("run {} rejected", run)));
            }
            return Err(JobError::retryable(format!("run {} failed", run)));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Gate {
    started: Notify,
    release: Notify,
    runs: AtomicU32,
}

#[derive(Serialize, Deserialize)]
struct GatedJob {
    key: String,
}

#[async_trait]
impl Job for GatedJob {
    type Context = Arc<Gate>;

    const JOB_TYPE: &'static str = "gated";

    async fn execute(&self, gate: Self::Context) -> Result<(), JobError> {
        gate.runs.fetch_add(1, Ordering::SeqCst);
        gate.started.notify_one();
        gate.release.notified().await;
        Ok(())
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(self.key.clone())
    }
}

fn flaky_queue(runs: Arc<AtomicU32>) -> LocalTaskQueue {
    let mut registry = JobRegistry::new();
    registry.register::<FlakyJob>(runs).unwrap();
    LocalTaskQueue::start(registry, fast_config())
}

#[tokio::test]
async fn successful_job_completes_once() {
    let runs = Arc::new(AtomicU32::new(0));
    let queue = flaky_queue(runs.clone());
    let mut events = queue.subscribe();

    let job_id = enqueue_job(&queue, &FlakyJob { fail_times: 0, permanent: false })
        .await
        .unwrap();

    let event = wait_terminal(&mut events, &job_id).await;
    assert_eq!(event.event_name(), "completed");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    queue.shutdown().await.unwrap();
}

#[tokio::test]
async fn retryable_failures_are_retried_until_success() {
    let runs = Arc::new(AtomicU32::new(0));
    let queue = flaky_queue(runs.clone());
    let mut events = queue.subscribe();

    let job_id = enqueue_job(&queue, &FlakyJob { fail_times: 2, permanent: false })
        .await
        .unwrap();

    let mut retries = 0;
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.job_id() != &job_id {
                continue;
            }
            match event {
                JobEvent::Retrying { .. } => retries += 1,
                e if e.is_terminal() => return e,
                _ => {}
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(outcome.event_name(), "completed");
    assert_eq!(retries, 2);
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    queue.shutdown().await.unwrap();
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let runs = Arc::new(AtomicU32::new(0));
    let queue = flaky_queue(runs.clone());
    let mut events = queue.subscribe();

    let job_id = enqueue_job(&queue, &FlakyJob { fail_times: 100, permanent: false })
        .await
        .unwrap();

    let event = wait_terminal(&mut events, &job_id).await;
    assert_eq!(event.event_name(), "failed");
    // first run plus MAX_RETRIES
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    queue.shutdown().await.unwrap();
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let runs = Arc::new(AtomicU32::new(0));
    let queue = flaky_queue(runs.clone());
    let mut events = queue.subscribe();

    let job_id = enqueue_job(&queue, &FlakyJob { fail_times: 1, permanent: true })
        .await
        .unwrap();

    match wait_terminal(&mut events, &job_id).await {
        JobEvent::Failed { error, .. } => assert!(error.contains("rejected")),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    queue.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_keys_collapse_onto_the_live_job() {
    let gate = Arc::new(Gate::default());
    let mut registry = JobRegistry::new();
    registry.register::<GatedJob>(gate.clone()).unwrap();
    let queue = LocalTaskQueue::start(registry, fast_config());
    let mut events = queue.subscribe();

    let job = GatedJob { key: "report.bin".into() };
    let first = enqueue_job(&queue, &job).await.unwrap();
    gate.started.notified().await;

    let second = enqueue_job(&queue, &job).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(queue.inflight(), 1);

    gate.release.notify_one();
    wait_terminal(&mut events, &first).await;

    assert_eq!(gate.runs.load(Ordering::SeqCst), 1);
    assert_eq!(queue.inflight(), 0);

    // once settled the key is free again
    let third = enqueue_job(&queue, &job).await.unwrap();
    assert_ne!(first, third);
    gate.release.notify_one();
    wait_terminal(&mut events, &third).await;

    queue.shutdown().await.unwrap();
}

#[tokio::test]
async fn enqueue_after_shutdown_is_rejected() {
    let queue = flaky_queue(Arc::new(AtomicU32::new(0)));
    queue.shutdown().await.unwrap();

    let err = enqueue_job(&queue, &FlakyJob { fail_times: 0, permanent: false })
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::WorkerShutdown));
}
