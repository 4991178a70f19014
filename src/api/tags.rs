//! Tag API endpoints
//!
//! - GET /api/v1/tags - Tag cloud with usage counts
//! - GET /api/v1/admin/tags - All tags
//! - PUT /api/v1/admin/tags/{id} - Rename
//! - DELETE /api/v1/admin/tags/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::common::audit;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Tag, TagWithCount};

#[derive(Debug, Deserialize)]
pub struct TagCloudQuery {
    /// Cap on the number of tags returned
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RenameTagRequest {
    pub name: String,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(tag_cloud))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags))
        .route("/{id}", put(rename_tag).delete(delete_tag))
}

/// GET /api/v1/tags
async fn tag_cloud(
    State(state): State<AppState>,
    Query(query): Query<TagCloudQuery>,
) -> Result<Json<Vec<TagWithCount>>, ApiError> {
    let limit = query.limit.filter(|l| *l > 0);
    Ok(Json(state.tag_service.list_with_counts(limit).await?))
}

/// GET /api/v1/admin/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.tag_service.list().await?))
}

/// PUT /api/v1/admin/tags/{id}
async fn rename_tag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RenameTagRequest>,
) -> Result<Json<Tag>, ApiError> {
    let tag = state.tag_service.rename(id, &body.name).await?;
    audit(&state, &user, "tag.rename", json!({ "id": id, "name": tag.name })).await;
    Ok(Json(tag))
}

/// DELETE /api/v1/admin/tags/{id} - detaches it from projects and posts
async fn delete_tag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(id).await?;
    audit(&state, &user, "tag.delete", json!({ "id": id })).await;
    Ok(StatusCode::NO_CONTENT)
}
