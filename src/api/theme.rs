//! Theme customizer endpoints
//!
//! Public:
//! - GET /api/v1/theme - Current theme settings
//! - GET /api/v1/theme.css - Theme as CSS custom properties, with ETag
//!
//! Admin:
//! - GET  /api/v1/admin/theme/presets
//! - PUT  /api/v1/admin/theme - Partial update (admin only)
//! - POST /api/v1/admin/theme/preset - Apply a preset (admin only)
//! - POST /api/v1/admin/theme/reset - Back to defaults (admin only)

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::common::audit;
use crate::api::middleware::{etag_matches, ApiError, AppState, AuthenticatedUser};
use crate::models::{ThemePatch, ThemeSettings};
use crate::services::theme::{css_etag, to_css, ThemePreset};

#[derive(Debug, Deserialize)]
pub struct ApplyPresetRequest {
    pub name: String,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(get_theme))
}

pub fn editor_router() -> Router<AppState> {
    Router::new().route("/presets", get(list_presets))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", put(update_theme))
        .route("/preset", post(apply_preset))
        .route("/reset", post(reset_theme))
}

/// GET /api/v1/theme
async fn get_theme(State(state): State<AppState>) -> Result<Json<ThemeSettings>, ApiError> {
    Ok(Json(state.theme_service.get().await?))
}

/// GET /api/v1/theme.css
pub async fn theme_css(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let theme = state.theme_service.get().await?;
    let css = to_css(&theme);
    let etag = css_etag(&css);

    let cache_headers = [
        (header::ETAG, etag.clone()),
        (header::CACHE_CONTROL, "public, max-age=0, must-revalidate".to_string()),
    ];
    let presented = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());
    if etag_matches(presented, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, cache_headers).into_response());
    }
    Ok((
        cache_headers,
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        css,
    )
        .into_response())
}

/// GET /api/v1/admin/theme/presets
async fn list_presets(State(state): State<AppState>) -> Json<&'static [ThemePreset]> {
    Json(state.theme_service.presets())
}

/// PUT /api/v1/admin/theme
async fn update_theme(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(patch): Json<ThemePatch>,
) -> Result<Json<ThemeSettings>, ApiError> {
    let theme = state.theme_service.update(patch).await?;
    audit(&state, &user, "theme.update", json!({ "preset": theme.preset })).await;
    Ok(Json(theme))
}

/// POST /api/v1/admin/theme/preset
async fn apply_preset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ApplyPresetRequest>,
) -> Result<Json<ThemeSettings>, ApiError> {
    let theme = state.theme_service.apply_preset(&body.name).await?;
    audit(&state, &user, "theme.preset", json!({ "preset": theme.preset })).await;
    Ok(Json(theme))
}

/// POST /api/v1/admin/theme/reset
async fn reset_theme(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ThemeSettings>, ApiError> {
    let theme = state.theme_service.reset().await?;
    audit(&state, &user, "theme.reset", json!({})).await;
    Ok(Json(theme))
}
