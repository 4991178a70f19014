//! Contact form and inquiry inbox
//!
//! - POST /api/v1/contact - Public submission (rate limited)
//! - GET  /api/v1/admin/inquiries - Inbox, optionally by status
//! - GET  /api/v1/admin/inquiries/counts
//! - GET/DELETE /api/v1/admin/inquiries/{id}
//! - PUT  /api/v1/admin/inquiries/{id}/status

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::common::{audit, default_page, default_per_page, ListResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ContactInput, ContactInquiry, InquiryStatus, ListParams};
use crate::services::analytics::ClientInfo;

#[derive(Debug, Deserialize)]
pub struct ListInquiriesQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<InquiryStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: InquiryStatus,
}

/// Same body whether or not the message was filtered
#[derive(Debug, Serialize)]
pub struct SubmittedResponse {
    pub received: bool,
}

pub fn submit_router() -> Router<AppState> {
    Router::new().route("/contact", post(submit))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_inquiries))
        .route("/counts", get(counts))
        .route("/{id}", get(get_inquiry).delete(delete_inquiry))
        .route("/{id}/status", put(update_status))
}

/// POST /api/v1/contact
async fn submit(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<ContactInput>,
) -> Result<(StatusCode, Json<SubmittedResponse>), ApiError> {
    state.contact_service.submit(body, &client).await?;
    Ok((StatusCode::CREATED, Json(SubmittedResponse { received: true })))
}

/// GET /api/v1/admin/inquiries
async fn list_inquiries(
    State(state): State<AppState>,
    Query(query): Query<ListInquiriesQuery>,
) -> Result<Json<ListResponse<ContactInquiry>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(
        state
            .contact_service
            .list(query.status, &params)
            .await?
            .into(),
    ))
}

/// GET /api/v1/admin/inquiries/counts
async fn counts(State(state): State<AppState>) -> Result<Json<BTreeMap<String, i64>>, ApiError> {
    Ok(Json(state.contact_service.counts_by_status().await?))
}

/// GET /api/v1/admin/inquiries/{id} - opening a new inquiry marks it read
async fn get_inquiry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ContactInquiry>, ApiError> {
    Ok(Json(state.contact_service.get(id).await?))
}

/// PUT /api/v1/admin/inquiries/{id}/status
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<StatusCode, ApiError> {
    state.contact_service.update_status(id, body.status).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/admin/inquiries/{id}
async fn delete_inquiry(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.contact_service.delete(id).await?;
    audit(&state, &user, "inquiry.delete", json!({ "id": id })).await;
    Ok(StatusCode::NO_CONTENT)
}
