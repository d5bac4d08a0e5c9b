//! Whole-document endpoints: read, export and import.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use super::{error, success, ApiResult};
use crate::errors::AppErrorWithRevision;
use crate::models::Document;
use crate::AppState;

/// File name offered for exported documents.
pub const EXPORT_FILE_NAME: &str = "silsilah.json";

/// GET /api/document - Get the full document.
pub async fn get_document(State(state): State<AppState>) -> ApiResult<Document> {
    let document = state.service.document().await;
    success(document, state.service.revision())
}

/// GET /api/document/export - Pretty-printed document as a download.
pub async fn export_document(State(state): State<AppState>) -> Response {
    match state.service.export().await {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => AppErrorWithRevision {
            error: e,
            revision: state.service.revision(),
        }
        .into_response(),
    }
}

/// POST /api/document/import - Replace the document with an uploaded file.
pub async fn import_document(State(state): State<AppState>, body: String) -> ApiResult<Document> {
    match state.service.import(&body).await {
        Ok(document) => success(document, state.service.revision()),
        Err(e) => error(e, state.service.revision()),
    }
}
