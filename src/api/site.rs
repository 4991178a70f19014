//! Site profile and health endpoints
//!
//! - GET /api/v1/health - Liveness with a database ping
//! - GET /api/v1/site - Public owner profile
//! - GET/PUT /api/v1/admin/settings - Profile editing (admin only)

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use crate::api::admin::APP_VERSION;
use crate::api::common::audit;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::SiteSettings;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/site", get(get_site))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/", get(get_settings).put(update_settings))
}

/// GET /api/v1/health - 503 when the database is unreachable
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.pool.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: "ok",
                version: APP_VERSION,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    database: "unreachable",
                    version: APP_VERSION,
                }),
            )
        }
    }
}

/// GET /api/v1/site
async fn get_site(State(state): State<AppState>) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.get_site_settings().await?))
}

/// GET /api/v1/admin/settings
async fn get_settings(State(state): State<AppState>) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.get_site_settings().await?))
}

/// PUT /api/v1/admin/settings - replaces the whole profile
async fn update_settings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SiteSettings>,
) -> Result<Json<SiteSettings>, ApiError> {
    let settings = state.settings_service.update_site_settings(body).await?;
    audit(&state, &user, "settings.update", json!({})).await;
    Ok(Json(settings))
}
