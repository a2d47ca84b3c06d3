use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Job, QueueResult};

/// Identifier handed out at enqueue time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Serialized job as submitted to a [`TaskQueue`](crate::TaskQueue)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    /// `Job::JOB_TYPE` of the payload
    pub job_type: String,

    /// JSON-encoded job payload
    pub payload_bytes: Vec<u8>,

    /// Maximum retry attempts after the first run
    pub max_retries: u32,

    /// Duplicate submissions with the same key collapse onto one live job
    pub idempotency_key: Option<String>,
}

impl JobMessage {
    /// Build a message from a typed job
    pub fn from_job<J: Job>(job: &J) -> QueueResult<Self> {
        Ok(Self {
            job_type: J::JOB_TYPE.to_string(),
            payload_bytes: serde_json::to_vec(job)?,
            max_retries: job.max_retries(),
            idempotency_key: job.idempotency_key(),
        })
    }

    /// Dedup key scoped by job type
    pub(crate) fn dedup_key(&self) -> Option<String> {
        self.idempotency_key
            .as_ref()
            .map(|key| format!("{}:{}", self.job_type, key))
    }
}

/// A message in flight, with its attempt counter
#[derive(Debug, Clone)]
pub struct JobEnvelope {
    pub job_id: JobId,
    pub message: JobMessage,
    /// 1-based attempt number
    pub attempt: u32,
}

/// Lifecycle events published by the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    Enqueued {
        job_id: JobId,
        job_type: String,
        at: DateTime<Utc>,
    },

    Started {
        job_id: JobId,
        attempt: u32,
        at: DateTime<Utc>,
    },

    Retrying {
        job_id: JobId,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    Completed {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Job failed permanently or ran out of retries
    Failed {
        job_id: JobId,
        error: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Short lowercase name, e.g. `"completed"`
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Started { .. } => "started",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }

    /// True for completed and failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
