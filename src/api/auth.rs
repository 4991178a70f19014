//! Authentication API endpoints
//!
//! - GET  /api/v1/auth/setup - Whether the first admin still has to be created
//! - POST /api/v1/auth/setup - Create the first admin and log in
//! - POST /api/v1/auth/login - Log in
//! - POST /api/v1/auth/logout - Log out
//! - GET  /api/v1/auth/me - Current user
//! - GET  /api/v1/auth/csrf - Fresh CSRF token for the session
//! - PUT  /api/v1/auth/password - Change password

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::common::audit;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, SessionToken};
use crate::models::{CreateUserInput, Session, User};
use crate::services::analytics::ClientInfo;
use crate::services::user::LoginInput;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
    pub csrf_token: String,
    pub expires_at: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub display_name: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.to_string(),
            display_name: user.display_name,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SetupStatusResponse {
    pub setup_required: bool,
}

#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

/// Public auth routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/setup", get(setup_status).post(setup))
        .route("/login", post(login))
}

/// Auth routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/csrf", get(get_csrf_token))
        .route("/password", put(change_password))
}

fn session_cookie(session: &Session) -> Result<HeaderValue, ApiError> {
    let max_age = (session.expires_at - session.created_at).num_seconds().max(0);
    HeaderValue::from_str(&format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id, max_age
    ))
    .map_err(ApiError::internal)
}

/// Session cookie plus the auth body, with a CSRF token already issued
async fn session_response(
    state: &AppState,
    session: Session,
    user: User,
) -> Result<(HeaderMap, AuthResponse), ApiError> {
    let csrf_token = state.csrf.issue(&session.id).await?;
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&session)?);
    Ok((
        headers,
        AuthResponse {
            user: user.into(),
            token: session.id,
            csrf_token,
            expires_at: session.expires_at.to_rfc3339(),
        },
    ))
}

/// GET /api/v1/auth/setup
async fn setup_status(State(state): State<AppState>) -> Result<Json<SetupStatusResponse>, ApiError> {
    Ok(Json(SetupStatusResponse {
        setup_required: state.user_service.setup_required().await?,
    }))
}

/// POST /api/v1/auth/setup - only while no account exists
async fn setup(
    State(state): State<AppState>,
    Json(body): Json<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let user = state.user_service.setup_admin(body).await?;
    tracing::info!(user_id = user.id, "Initial admin created");

    let (session, user) = state
        .user_service
        .login(LoginInput::new(user.username.clone(), password))
        .await?;
    let (headers, body) = session_response(&state, session, user).await?;
    Ok((StatusCode::CREATED, headers, Json(body)))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (session, user) = state
        .user_service
        .login(LoginInput::new(body.username_or_email, body.password))
        .await?;

    let visitor = state.analytics_service.visitor_hash(&client);
    audit(&state, &AuthenticatedUser(user.clone()), "auth.login", json!({ "visitor": visitor })).await;

    let (headers, body) = session_response(&state, session, user).await?;
    Ok((headers, Json(body)))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    session: SessionToken,
) -> Result<impl IntoResponse, ApiError> {
    state.user_service.logout(&session.token).await?;
    state.csrf.revoke(&session.token).await;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/v1/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// GET /api/v1/auth/csrf - replaces any earlier token for the session
async fn get_csrf_token(
    State(state): State<AppState>,
    session: SessionToken,
) -> Result<Json<CsrfResponse>, ApiError> {
    Ok(Json(CsrfResponse {
        csrf_token: state.csrf.issue(&session.token).await?,
    }))
}

/// PUT /api/v1/auth/password
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .user_service
        .change_password(&user.0, &body.current_password, &body.new_password)
        .await?;
    audit(&state, &user, "auth.password_change", json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}
