//! Member API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::models::{AddMemberRequest, EditMemberRequest, NamesQuery, Record, SearchQuery};
use crate::store::SearchHit;
use crate::AppState;

/// GET /api/members/roots - Top-level records for rendering.
pub async fn list_roots(State(state): State<AppState>) -> ApiResult<Vec<Record>> {
    let roots = state.service.roots().await;
    success(roots, state.service.revision())
}

/// GET /api/members/search?q= - Name search with descendant closures.
pub async fn search_members(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<SearchHit>> {
    let hits = state.service.search(&query.q).await;
    success(hits, state.service.revision())
}

/// GET /api/members/names?prefix= - Autocomplete for parent/spouse inputs.
pub async fn suggest_names(
    State(state): State<AppState>,
    Query(query): Query<NamesQuery>,
) -> ApiResult<Vec<String>> {
    let names = state.service.suggest_names(&query.prefix).await;
    success(names, state.service.revision())
}

/// GET /api/members/:id - Get a single member.
pub async fn get_member(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Record> {
    let revision = state.service.revision();

    match state.service.record(&id).await {
        Ok(record) => success(record, revision),
        Err(e) => error(e, revision),
    }
}

/// POST /api/members - Add a member.
pub async fn add_member(
    State(state): State<AppState>,
    Json(request): Json<AddMemberRequest>,
) -> ApiResult<Record> {
    match state.service.add_member(&request).await {
        Ok(record) => success(record, state.service.revision()),
        Err(e) => error(e, state.service.revision()),
    }
}

/// PUT /api/members/:id - Edit a member.
pub async fn edit_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EditMemberRequest>,
) -> ApiResult<Record> {
    match state.service.edit_member(&id, &request).await {
        Ok(record) => success(record, state.service.revision()),
        Err(e) => error(e, state.service.revision()),
    }
}

/// DELETE /api/members/:id/spouse - Dissolve a pairing.
pub async fn unlink_spouse(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Record> {
    match state.service.unlink_spouse(&id).await {
        Ok(record) => success(record, state.service.revision()),
        Err(e) => error(e, state.service.revision()),
    }
}

/// DELETE /api/members/:id - Delete a member and its descendants.
///
/// Responds with the removed ids; unknown ids succeed with an empty list.
pub async fn delete_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<String>> {
    match state.service.delete_member(&id).await {
        Ok(removed) => success(removed, state.service.revision()),
        Err(e) => error(e, state.service.revision()),
    }
}
