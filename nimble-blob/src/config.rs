use std::time::Duration;

/// Configuration for the blob lifecycle
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// How long an upload attempt holds an object before others may take over
    pub upload_lease: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            upload_lease: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl LifecycleConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upload lease length
    pub fn with_upload_lease(mut self, lease: Duration) -> Self {
        self.upload_lease = lease;
        self
    }

    pub(crate) fn lease_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.upload_lease).unwrap_or_else(|_| chrono::Duration::minutes(5))
    }
}
