//! REST API module.
//!
//! The presentation layer drives the engine through these routes and re-renders
//! whenever the `revision` in a response or in the sync status changes.

mod document;
mod members;
mod sync;

pub use document::*;
pub use members::*;
pub use sync::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision: u64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision: u64) -> Self {
        Self {
            success: true,
            data,
            revision,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision: u64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: crate::errors::AppError, revision: u64) -> ApiResult<T> {
    Err(crate::errors::AppErrorWithRevision {
        error: err,
        revision,
    })
}
