use std::fmt;

use thiserror::Error;

/// Result type for blob lifecycle operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Where a payload was expected but missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Staging,
    Remote,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Staging => f.write_str("staging"),
            Stage::Remote => f.write_str("remote"),
        }
    }
}

/// Errors that can occur during blob lifecycle operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Object already exists: {name}")]
    Conflict { name: String },

    #[error("Unsupported backend: {backend}")]
    UnsupportedBackend { backend: String },

    #[error("Object not found: {name}")]
    NotFound { name: String },

    /// Metadata and payload disagree; needs operator attention
    #[error("Inconsistent state for {name}: metadata exists but the {stage} payload is missing")]
    InconsistentState { name: String, stage: Stage },

    #[error("Upload of {name} failed: {reason}")]
    UploadFailed { name: String, reason: String },

    #[error("Invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    pub fn conflict<S: Into<String>>(name: S) -> Self {
        Self::Conflict { name: name.into() }
    }

    pub fn unsupported_backend<S: Into<String>>(backend: S) -> Self {
        Self::UnsupportedBackend {
            backend: backend.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn inconsistent<S: Into<String>>(name: S, stage: Stage) -> Self {
        Self::InconsistentState {
            name: name.into(),
            stage,
        }
    }

    /// Create an upload failed error
    pub fn upload_failed<N: Into<String>, R: fmt::Display>(name: N, reason: R) -> Self {
        Self::UploadFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_name<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors the caller caused; retrying the same request cannot succeed
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. }
                | Self::UnsupportedBackend { .. }
                | Self::NotFound { .. }
                | Self::InvalidName { .. }
        )
    }

    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UploadFailed { .. } | Self::Backend { .. } | Self::Io { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inconsistent_state_names_the_missing_stage() {
        let err = BlobError::inconsistent("report.bin", Stage::Remote);
        assert_eq!(
            err.to_string(),
            "Inconsistent state for report.bin: metadata exists but the remote payload is missing"
        );
        assert!(!err.is_not_found());
        assert!(!err.is_client_error());
    }

    #[test]
    fn classification() {
        assert!(BlobError::conflict("x").is_client_error());
        assert!(BlobError::unsupported_backend("dropbox").is_client_error());
        assert!(BlobError::upload_failed("x", "timeout").is_retryable());
        assert!(!BlobError::not_found("x").is_retryable());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(BlobError::from(io).is_retryable());
    }
}
