use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UploadToken;

/// Persisted metadata for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRecord {
    pub name: String,
    /// Normalized backend tag the object is destined for
    pub backend: String,
    /// Flips to true once, after the remote write is acknowledged
    pub uploaded: bool,
    pub created_at: DateTime<Utc>,
    /// Present while an upload attempt holds the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadLease>,
}

impl BlobRecord {
    pub fn new(name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: backend.into(),
            uploaded: false,
            created_at: Utc::now(),
            upload: None,
        }
    }

    /// True when a live (unexpired) lease is held at `now`
    pub fn is_uploading(&self, now: DateTime<Utc>) -> bool {
        self.upload
            .as_ref()
            .map(|lease| lease.lease_until > now)
            .unwrap_or(false)
    }
}

/// Upload lease with its fencing token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLease {
    pub token: UploadToken,
    pub lease_until: DateTime<Utc>,
}

/// Result of trying to claim an object for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadClaim {
    Acquired,
    AlreadyUploaded,
    /// Another attempt holds a live lease
    Held { lease_until: DateTime<Utc> },
}
