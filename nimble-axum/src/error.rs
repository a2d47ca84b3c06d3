use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nimble_blob::BlobError;
use serde_json::{json, Value};

/// Error categories exposed over HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    PayloadTooLarge,
    GeneralError,
    InconsistentState,
    BadGateway,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::GeneralError => 500,
            ErrorKind::InconsistentState => 500,
            ErrorKind::BadGateway => 502,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::InconsistentState => "InconsistentState",
            ErrorKind::BadGateway => "BadGateway",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PayloadTooLarge => "payload-too-large",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::InconsistentState => "inconsistent-state",
            ErrorKind::BadGateway => "bad-gateway",
        }
    }
}

/// JSON error response: `{ name, message, code, className }`
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn general_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, message)
    }

    /// Map an extractor rejection; oversized bodies keep their 413
    pub fn from_rejection(status: StatusCode, body_text: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Self::new(ErrorKind::PayloadTooLarge, body_text)
        } else {
            Self::bad_request(body_text)
        }
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.kind.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.kind.class_name(),
        })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        let kind = match &err {
            BlobError::InvalidName { .. } | BlobError::UnsupportedBackend { .. } => {
                ErrorKind::BadRequest
            }
            BlobError::NotFound { .. } => ErrorKind::NotFound,
            BlobError::Conflict { .. } => ErrorKind::Conflict,
            BlobError::InconsistentState { .. } => ErrorKind::InconsistentState,
            BlobError::UploadFailed { .. } => ErrorKind::BadGateway,
            BlobError::Backend { .. } | BlobError::Io { .. } | BlobError::Serialization { .. } => {
                tracing::error!(error = %err, "Request failed on an infrastructure error");
                return Self::general_error("Internal server error");
            }
        };
        Self::new(kind, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
