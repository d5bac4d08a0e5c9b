//! Sync status and control endpoints.

use axum::extract::State;

use super::{success, ApiResult};
use crate::models::SyncSnapshot;
use crate::AppState;

/// GET /api/sync/status - Current sync indicator state.
pub async fn sync_status(State(state): State<AppState>) -> ApiResult<SyncSnapshot> {
    let snapshot = state.service.sync().snapshot();
    let revision = snapshot.revision;
    success(snapshot, revision)
}

/// POST /api/sync/retry - Manual sync: upload pending edits or check the server.
pub async fn retry_sync(State(state): State<AppState>) -> ApiResult<SyncSnapshot> {
    state.service.sync().retry();
    let snapshot = state.service.sync().snapshot();
    let revision = snapshot.revision;
    success(snapshot, revision)
}

/// POST /api/sync/focus - The UI regained focus; poll the remote now.
pub async fn focus_sync(State(state): State<AppState>) -> ApiResult<SyncSnapshot> {
    state.service.sync().focus();
    let snapshot = state.service.sync().snapshot();
    let revision = snapshot.revision;
    success(snapshot, revision)
}
