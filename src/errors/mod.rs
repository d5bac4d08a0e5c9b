//! Error handling module for the Silsilah sync engine.
//!
//! Provides the error taxonomy shared by the store, the sync engine and the REST
//! surface, with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const NAME_REQUIRED: &str = "NAME_REQUIRED";
    pub const SELF_PAIRING: &str = "SELF_PAIRING";
    pub const SELF_PARENTING: &str = "SELF_PARENTING";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const PARENT_NOT_FOUND: &str = "PARENT_NOT_FOUND";
    pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
    pub const CORRUPT_DATA: &str = "CORRUPT_DATA";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Synchronous input rejections. The operation has no effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required name was empty or blank
    NameRequired,
    /// A record was asked to become its own spouse
    SelfPairing,
    /// A record was asked to become its own child
    SelfParenting,
}

impl ValidationError {
    fn code(&self) -> &'static str {
        match self {
            ValidationError::NameRequired => codes::NAME_REQUIRED,
            ValidationError::SelfPairing => codes::SELF_PAIRING,
            ValidationError::SelfParenting => codes::SELF_PARENTING,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ValidationError::NameRequired => "Name is required",
            ValidationError::SelfPairing => "A member cannot be their own spouse",
            ValidationError::SelfParenting => "A member cannot be their own child",
        }
    }
}

/// Application error type.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Rejected input
    Validation(ValidationError),
    /// Unknown member id
    NotFound(String),
    /// Parent name given but no record carries it
    ParentNotFound(String),
    /// Remote fetch or write failure
    Transport(String),
    /// Malformed persisted, fetched or imported document
    CorruptData(String),
    /// Local cache failure
    Database(String),
    /// Internal error
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ParentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::CorruptData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(v) => v.code(),
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::ParentNotFound(_) => codes::PARENT_NOT_FOUND,
            AppError::Transport(_) => codes::TRANSPORT_ERROR,
            AppError::CorruptData(_) => codes::CORRUPT_DATA,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Validation(v) => v.message().to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::ParentNotFound(name) => format!("Parent {} not found", name),
            AppError::Transport(msg) => msg.clone(),
            AppError::CorruptData(msg) => msg.clone(),
            AppError::Database(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::warn!("JSON error: {:?}", err);
        AppError::CorruptData(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::debug!("Transport error: {:?}", err);
        AppError::Transport(format!("Transport error: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
    pub revision: u64,
}

impl ErrorResponse {
    pub fn new(error: &AppError, revision: u64) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
            },
            revision,
        }
    }
}

/// Wrapper type for errors that carry the document revision.
pub struct AppErrorWithRevision {
    pub error: AppError,
    pub revision: u64,
}

impl IntoResponse for AppErrorWithRevision {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = ErrorResponse::new(&self.error, self.revision);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let err = AppError::from(ValidationError::SelfPairing);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), codes::SELF_PAIRING);
    }

    #[test]
    fn test_parent_not_found_message_names_parent() {
        let err = AppError::ParentNotFound("Ann".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "PARENT_NOT_FOUND: Parent Ann not found");
    }

    #[test]
    fn test_json_error_is_corrupt_data() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err = AppError::from(parse.unwrap_err());
        assert_eq!(err.error_code(), codes::CORRUPT_DATA);
    }
}
