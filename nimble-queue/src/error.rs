use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

/// Failures of the queue itself, as opposed to the jobs it runs
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Job type already registered: {0}")]
    JobTypeAlreadyRegistered(String),

    #[error("Could not encode job payload: {0}")]
    SerializationError(String),

    #[error("Queue is shut down")]
    WorkerShutdown,

    #[error("Queue internal error: {0}")]
    Internal(String),
}

/// How a job run failed; decides whether the pool retries it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Transient; retried while the budget lasts
    #[error("retryable: {0}")]
    Retryable(String),

    /// Retrying cannot help
    #[error("permanent: {0}")]
    Permanent(String),
}

impl JobError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_and_permanent_are_distinguished() {
        let retry = JobError::retryable("remote timed out");
        let fatal = JobError::permanent("bad payload");

        assert!(retry.is_retryable());
        assert!(!fatal.is_retryable());
        assert_eq!(retry.message(), "remote timed out");
        assert_eq!(fatal.to_string(), "permanent: bad payload");
    }

    #[test]
    fn serde_errors_become_serialization_errors() {
        let err = serde_json::from_slice::<u32>(b"nope").unwrap_err();
        let queue_err: QueueError = err.into();
        assert!(matches!(queue_err, QueueError::SerializationError(_)));
    }
}
