//! Project API endpoints
//!
//! Public:
//! - GET /api/v1/projects - Published projects, featured first
//! - GET /api/v1/projects/{slug} - One published project
//!
//! Admin:
//! - GET/POST /api/v1/admin/projects
//! - GET/PUT/DELETE /api/v1/admin/projects/{id}
//! - PUT /api/v1/admin/projects/order
//! - GET/POST /api/v1/admin/projects/{id}/images
//! - DELETE /api/v1/admin/projects/{id}/images/{image_id}
//! - PUT /api/v1/admin/projects/{id}/images/order

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::common::{audit, default_page, default_per_page, ListResponse, OrderRequest};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    ContentStatus, CreateImageInput, CreateProjectInput, ListParams, Project, ProjectFilter,
    ProjectImage, UpdateProjectInput,
};

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<ContentStatus>,
    pub featured: Option<bool>,
    /// Tag slug
    pub tag: Option<String>,
}

impl ListProjectsQuery {
    fn split(self) -> (ProjectFilter, ListParams) {
        (
            ProjectFilter {
                status: self.status,
                featured: self.featured,
                tag: self.tag.filter(|t| !t.trim().is_empty()),
            },
            ListParams::new(self.page, self.per_page),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(flatten)]
    pub project: CreateProjectInput,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(flatten)]
    pub project: UpdateProjectInput,
    /// Replaces the tag set when present
    pub tags: Option<Vec<String>>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published))
        .route("/{slug}", get(get_published))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all).post(create_project))
        .route("/order", put(reorder_projects))
        .route(
            "/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/{id}/images", get(list_images).post(add_image))
        .route("/{id}/images/order", put(reorder_images))
        .route("/{id}/images/{image_id}", delete(remove_image))
}

/// GET /api/v1/projects
async fn list_published(
    State(state): State<AppState>,
    Query(query): Query<ListProjectsQuery>,
) -> Result<Json<ListResponse<Project>>, ApiError> {
    let (filter, params) = query.split();
    let result = state
        .project_service
        .list_published(&filter, &params)
        .await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/projects/{slug}
async fn get_published(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(
        state.project_service.get_published_by_slug(&slug).await?,
    ))
}

/// GET /api/v1/admin/projects
async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<ListProjectsQuery>,
) -> Result<Json<ListResponse<Project>>, ApiError> {
    let (filter, params) = query.split();
    Ok(Json(state.project_service.list(&filter, &params).await?.into()))
}

/// POST /api/v1/admin/projects
async fn create_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let project = state
        .project_service
        .create(body.project, &body.tags)
        .await?;
    audit(&state, &user, "project.create", json!({ "id": project.id, "slug": project.slug })).await;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/v1/admin/projects/{id}
async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.project_service.get_by_id(id).await?))
}

/// PUT /api/v1/admin/projects/{id}
async fn update_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    let project = state
        .project_service
        .update(id, body.project, body.tags.as_deref())
        .await?;
    audit(&state, &user, "project.update", json!({ "id": id })).await;
    Ok(Json(project))
}

/// DELETE /api/v1/admin/projects/{id} - images go with it
async fn delete_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.project_service.delete(id).await?;
    audit(&state, &user, "project.delete", json!({ "id": id })).await;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/admin/projects/order
async fn reorder_projects(
    State(state): State<AppState>,
    Json(body): Json<OrderRequest>,
) -> Result<StatusCode, ApiError> {
    state.project_service.reorder(&body.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/projects/{id}/images
async fn list_images(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ProjectImage>>, ApiError> {
    Ok(Json(state.project_service.list_images(id).await?))
}

/// POST /api/v1/admin/projects/{id}/images
async fn add_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<CreateImageInput>,
) -> Result<(StatusCode, Json<ProjectImage>), ApiError> {
    let image = state.project_service.add_image(id, body).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

/// DELETE /api/v1/admin/projects/{id}/images/{image_id}
async fn remove_image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.project_service.remove_image(id, image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/admin/projects/{id}/images/order
async fn reorder_images(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<OrderRequest>,
) -> Result<Json<Vec<ProjectImage>>, ApiError> {
    Ok(Json(
        state.project_service.reorder_images(id, &body.ids).await?,
    ))
}
