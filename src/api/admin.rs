//! Admin API endpoints
//!
//! Editors and admins:
//! - GET  /api/v1/admin/dashboard - Content, inbox and traffic overview
//! - GET  /api/v1/admin/system - Process memory, uptime and request stats
//! - GET  /api/v1/admin/github/repos - Importable GitHub repositories
//! - POST /api/v1/admin/github/import - Create a draft project from a repository
//!
//! Admins only:
//! - GET/POST /api/v1/admin/users
//! - DELETE /api/v1/admin/users/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::process;
use sysinfo::{Pid, System};

use crate::api::auth::UserResponse;
use crate::api::common::audit;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateUserInput, Project, UserRole};
use crate::services::dashboard::DashboardStats;
use crate::services::github::GithubRepo;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process and request statistics
#[derive(Debug, Serialize)]
pub struct SystemStatsResponse {
    pub version: String,
    /// Resident memory of this process in bytes
    pub memory_bytes: u64,
    pub memory_formatted: String,
    pub system_total_memory: u64,
    pub system_used_memory: u64,
    pub os_name: String,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub repo: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(flatten)]
    pub user: CreateUserInput,
    #[serde(default = "default_role")]
    pub role: UserRole,
}

fn default_role() -> UserRole {
    UserRole::Editor
}

pub fn editor_router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/system", get(get_system_stats))
        .route("/github/repos", get(list_github_repos))
        .route("/github/import", post(import_github_repo))
}

/// Mounted at `/admin/users`
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", delete(delete_user))
}

/// GET /api/v1/admin/dashboard
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.dashboard_service.stats().await?))
}

/// GET /api/v1/admin/system
async fn get_system_stats(State(state): State<AppState>) -> Json<SystemStatsResponse> {
    let mut sys = System::new_all();
    sys.refresh_all();

    let memory_bytes = sys
        .process(Pid::from_u32(process::id()))
        .map_or(0, |p| p.memory());
    let uptime_seconds = state.request_stats.uptime_seconds();

    Json(SystemStatsResponse {
        version: APP_VERSION.to_string(),
        memory_bytes,
        memory_formatted: format_bytes(memory_bytes),
        system_total_memory: sys.total_memory(),
        system_used_memory: sys.used_memory(),
        os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
        uptime_seconds,
        uptime_formatted: format_uptime(uptime_seconds),
        total_requests: state.request_stats.total_requests(),
        avg_response_time_ms: state.request_stats.avg_response_time_us() / 1000.0,
    })
}

/// GET /api/v1/admin/github/repos
async fn list_github_repos(
    State(state): State<AppState>,
) -> Result<Json<Vec<GithubRepo>>, ApiError> {
    Ok(Json(state.github_service.list_repos().await?))
}

/// POST /api/v1/admin/github/import
async fn import_github_repo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ImportRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let project = state.github_service.import(&body.repo).await?;
    audit(&state, &user, "github.import", json!({ "repo": body.repo, "project_id": project.id })).await;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/v1/admin/users
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.user_service.list().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// POST /api/v1/admin/users
async fn create_user(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state.user_service.create_user(body.user, body.role).await?;
    audit(
        &state,
        &actor,
        "user.create",
        json!({ "id": user.id, "username": user.username, "role": user.role.to_string() }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// DELETE /api/v1/admin/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete(&actor.0, id).await?;
    audit(&state, &actor, "user.delete", json!({ "id": id })).await;
    Ok(StatusCode::NO_CONTENT)
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{test_app, PASSWORD};
    use axum::http::Method;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m");
        assert_eq!(format_uptime(3 * 3600 + 60), "3h 1m");
        assert_eq!(format_uptime(2 * 86400 + 5 * 3600), "2d 5h 0m");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(45 * 1024 * 1024), "45.00 MB");
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();
        app.send(
            Method::POST,
            "/api/v1/admin/projects",
            Some(json!({"title": "Live", "status": "published"})),
            Some(&auth),
        )
        .await;
        app.send(
            Method::POST,
            "/api/v1/admin/projects",
            Some(json!({"title": "Draft"})),
            Some(&auth),
        )
        .await;

        let (status, stats) = app.get("/api/v1/admin/dashboard", Some(&auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["projects"]["total"], 2);
        assert_eq!(stats["projects"]["published"], 1);
        assert_eq!(stats["posts"]["total"], 0);
        assert_eq!(stats["inquiries"]["new"], 0);
        assert_eq!(stats["active_subscribers"], 0);
    }

    #[tokio::test]
    async fn test_system_stats() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();
        app.get("/api/v1/health", None).await;

        let (status, stats) = app.get("/api/v1/admin/system", Some(&auth)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["version"], APP_VERSION);
        assert!(stats["total_requests"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_github_requires_configuration() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();
        let (status, body) = app.get("/api/v1/admin/github/repos", Some(&auth)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = app
            .send(
                Method::POST,
                "/api/v1/admin/github/import",
                Some(json!({"repo": "folio"})),
                Some(&auth),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_user_management_is_admin_only() {
        let app = test_app().await;
        let editor = app.editor().await.bearer();
        let admin = app.admin().await.cookie();
        let new_user = json!({
            "username": "writer",
            "email": "writer@example.com",
            "password": PASSWORD
        });

        let (status, _) = app
            .send(Method::POST, "/api/v1/admin/users", Some(new_user.clone()), Some(&editor))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) = app
            .send(Method::POST, "/api/v1/admin/users", Some(new_user.clone()), Some(&admin))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["role"], "editor");

        let (status, _) = app
            .send(Method::POST, "/api/v1/admin/users", Some(new_user), Some(&admin))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, users) = app.get("/api/v1/admin/users", Some(&admin)).await;
        assert_eq!(users.as_array().unwrap().len(), 3);

        let id = created["id"].as_i64().unwrap();
        let (status, _) = app
            .send(Method::DELETE, &format!("/api/v1/admin/users/{}", id), None, Some(&admin))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_admin_cannot_delete_self() {
        let app = test_app().await;
        let admin = app.admin().await.bearer();
        let (_, me) = app.get("/api/v1/auth/me", Some(&admin)).await;
        let id = me["id"].as_i64().unwrap();
        let (status, _) = app
            .send(Method::DELETE, &format!("/api/v1/admin/users/{}", id), None, Some(&admin))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
