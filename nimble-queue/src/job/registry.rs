use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Job, JobError, JobMessage, QueueError, QueueResult};

/// Object-safe face of a registered [`Job`] type
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Decode the payload and run the job
    async fn execute(&self, message: &JobMessage) -> Result<(), JobError>;

    fn job_type(&self) -> &'static str;
}

/// Handler bound to the context its jobs run with
struct ConcreteJobHandler<J: Job> {
    context: J::Context,
    _phantom: PhantomData<fn() -> J>,
}

impl<J: Job> ConcreteJobHandler<J> {
    fn new(context: J::Context) -> Self {
        Self {
            context,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<J: Job> JobHandler for ConcreteJobHandler<J> {
    async fn execute(&self, message: &JobMessage) -> Result<(), JobError> {
        let job: J = serde_json::from_slice(&message.payload_bytes)
            .map_err(|e| JobError::permanent(format!("undecodable {} payload: {e}", J::JOB_TYPE)))?;

        job.execute(self.context.clone()).await
    }

    fn job_type(&self) -> &'static str {
        J::JOB_TYPE
    }
}

/// Job types known to a worker pool, keyed by `JOB_TYPE`
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a job type together with its execution context
    pub fn register<J: Job>(&mut self, context: J::Context) -> QueueResult<()> {
        let handler = Arc::new(ConcreteJobHandler::<J>::new(context));
        let job_type = handler.job_type().to_string();

        if self.handlers.contains_key(&job_type) {
            return Err(QueueError::JobTypeAlreadyRegistered(job_type));
        }

        self.handlers.insert(job_type, handler);
        Ok(())
    }

    /// Decode and run `message` with its registered handler
    pub async fn execute_job(&self, message: &JobMessage) -> Result<(), JobError> {
        let handler = self
            .handlers
            .get(&message.job_type)
            .ok_or_else(|| JobError::permanent(format!("no handler for job type {}", message.job_type)))?;

        handler.execute(message).await
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, in no particular order
    pub fn registered_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct EchoJob {
        data: String,
    }

    #[async_trait]
    impl Job for EchoJob {
        type Context = Arc<Mutex<Vec<String>>>;

        const JOB_TYPE: &'static str = "echo";

        async fn execute(&self, ctx: Self::Context) -> Result<(), JobError> {
            ctx.lock().push(self.data.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn registered_job_runs_with_its_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = JobRegistry::new();
        registry.register::<EchoJob>(seen.clone()).unwrap();

        assert!(registry.is_registered("echo"));
        assert_eq!(registry.registered_types(), vec!["echo"]);

        let message = JobMessage::from_job(&EchoJob { data: "hello".into() }).unwrap();
        registry.execute_job(&message).await.unwrap();

        assert_eq!(*seen.lock(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let mut registry = JobRegistry::new();
        registry.register::<EchoJob>(Arc::default()).unwrap();

        let err = registry.register::<EchoJob>(Arc::default()).unwrap_err();
        assert!(matches!(err, QueueError::JobTypeAlreadyRegistered(t) if t == "echo"));
    }

    #[tokio::test]
    async fn unknown_job_type_is_permanent() {
        let registry = JobRegistry::new();
        let mut message = JobMessage::from_job(&EchoJob { data: "x".into() }).unwrap();
        message.job_type = "unknown_job".into();

        let err = registry.execute_job(&message).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn undecodable_payload_is_permanent() {
        let mut registry = JobRegistry::new();
        registry.register::<EchoJob>(Arc::default()).unwrap();

        let mut message = JobMessage::from_job(&EchoJob { data: "x".into() }).unwrap();
        message.payload_bytes = vec![1, 2, 3];

        let err = registry.execute_job(&message).await.unwrap_err();
        assert!(matches!(err, JobError::Permanent(m) if m.contains("undecodable")));
    }
}
