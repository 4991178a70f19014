//! API middleware
//!
//! Contains middleware for:
//! - Authentication (session cookie or bearer token)
//! - Authorization (editor and admin roles)
//! - CSRF checks on cookie-authenticated writes
//! - Per-IP rate limiting
//! - Request statistics and persistence of server errors

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAnalyticsRepository, SqlxBlogPostRepository, SqlxCategoryRepository,
    SqlxInquiryRepository, SqlxMediaRepository, SqlxProjectRepository, SqlxSessionRepository,
    SqlxSettingsRepository, SqlxSubscriberRepository, SqlxTagRepository, SqlxThemeRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{EventType, User};
use crate::services::analytics::{AnalyticsService, AnalyticsServiceError, ClientInfo};
use crate::services::blog::{BlogService, BlogServiceError};
use crate::services::category::{CategoryService, CategoryServiceError};
use crate::services::contact::{ContactService, ContactServiceError};
use crate::services::csrf::CsrfStore;
use crate::services::dashboard::DashboardService;
use crate::services::email::EmailService;
use crate::services::github::{GithubService, GithubServiceError};
use crate::services::markdown::MarkdownRenderer;
use crate::services::media::{MediaService, MediaServiceError};
use crate::services::project::{ProjectService, ProjectServiceError};
use crate::services::rate_limiter::{FixedWindowLimiter, RateDecision, LOGIN_WINDOW_MINUTES};
use crate::services::settings::{SettingsService, SettingsServiceError};
use crate::services::subscriber::{SubscriberService, SubscriberServiceError};
use crate::services::tag::{TagService, TagServiceError};
use crate::services::theme::{ThemeService, ThemeServiceError};
use crate::services::user::{UserService, UserServiceError};

/// Header carrying the CSRF token on cookie-authenticated writes
pub const CSRF_HEADER: &str = "x-csrf-token";

// ============================================================================
// Request Statistics
// ============================================================================

/// Request count and latency, kept with atomics
pub struct RequestStats {
    total_requests: AtomicU64,
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Mean response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.total_response_time_us.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub project_service: Arc<ProjectService>,
    pub blog_service: Arc<BlogService>,
    pub tag_service: Arc<TagService>,
    pub category_service: Arc<CategoryService>,
    pub theme_service: Arc<ThemeService>,
    pub settings_service: Arc<SettingsService>,
    pub contact_service: Arc<ContactService>,
    pub subscriber_service: Arc<SubscriberService>,
    pub media_service: Arc<MediaService>,
    pub analytics_service: Arc<AnalyticsService>,
    pub github_service: Arc<GithubService>,
    pub dashboard_service: Arc<DashboardService>,
    pub email_service: Arc<EmailService>,
    pub csrf: CsrfStore,
    /// Every public API request, per client IP
    pub api_limiter: FixedWindowLimiter,
    /// Contact and subscribe submissions, per client IP
    pub contact_limiter: FixedWindowLimiter,
    pub request_stats: Arc<RequestStats>,
}

impl AppState {
    /// Wire every repository and service over one pool and cache
    pub fn new(config: Config, pool: DynDatabasePool, cache: Arc<Cache>) -> anyhow::Result<Self> {
        let markdown = MarkdownRenderer::shared();
        let email = Arc::new(EmailService::new(config.email.clone())?);
        let public_url = config.server.public_url.clone();

        let analytics_service = Arc::new(AnalyticsService::new(
            SqlxAnalyticsRepository::boxed(pool.clone()),
            config.analytics.clone(),
        ));
        let tag_service = Arc::new(TagService::new(
            SqlxTagRepository::boxed(pool.clone()),
            cache.clone(),
        ));
        let category_service = Arc::new(CategoryService::new(
            SqlxCategoryRepository::boxed(pool.clone()),
            cache.clone(),
        ));
        let project_service = Arc::new(ProjectService::new(
            SqlxProjectRepository::boxed(pool.clone()),
            tag_service.clone(),
            cache.clone(),
            markdown.clone(),
        ));
        let blog_service = Arc::new(BlogService::new(
            SqlxBlogPostRepository::boxed(pool.clone()),
            tag_service.clone(),
            category_service.clone(),
            cache.clone(),
            markdown,
        ));
        let contact_service = Arc::new(ContactService::new(
            SqlxInquiryRepository::boxed(pool.clone()),
            analytics_service.clone(),
            email.clone(),
            public_url.clone(),
        ));
        let subscriber_service = Arc::new(SubscriberService::new(
            SqlxSubscriberRepository::boxed(pool.clone()),
            analytics_service.clone(),
            email.clone(),
            public_url,
        ));
        let media_service = Arc::new(MediaService::new(
            SqlxMediaRepository::boxed(pool.clone()),
            analytics_service.clone(),
            config.upload.clone(),
        ));
        let github_service = Arc::new(GithubService::new(
            config.github.clone(),
            project_service.clone(),
            cache.clone(),
        )?);
        let dashboard_service = Arc::new(DashboardService::new(
            project_service.clone(),
            blog_service.clone(),
            contact_service.clone(),
            subscriber_service.clone(),
            analytics_service.clone(),
        ));
        let user_service = Arc::new(UserService::with_session_days(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            config.security.session_days,
        ));
        let theme_service = Arc::new(ThemeService::new(
            SqlxThemeRepository::boxed(pool.clone()),
            cache.clone(),
        ));
        let settings_service = Arc::new(SettingsService::new(
            SqlxSettingsRepository::boxed(pool.clone()),
            cache,
        ));

        let security = &config.security;
        let csrf = CsrfStore::new(Duration::from_secs(security.csrf_ttl_seconds))?;
        let api_limiter = FixedWindowLimiter::new(
            Duration::from_secs(security.rate_limit.window_seconds),
            security.rate_limit.max_requests,
        );
        let contact_limiter = FixedWindowLimiter::new(
            Duration::from_secs(security.contact_rate_limit.window_seconds),
            security.contact_rate_limit.max_requests,
        );

        Ok(Self {
            pool,
            config: Arc::new(config),
            user_service,
            project_service,
            blog_service,
            tag_service,
            category_service,
            theme_service,
            settings_service,
            contact_service,
            subscriber_service,
            media_service,
            analytics_service,
            github_service,
            dashboard_service,
            email_service: email,
            csrf,
            api_limiter,
            contact_limiter,
            request_stats: Arc::new(RequestStats::new()),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn csrf_rejected() -> Self {
        Self::new("CSRF_REJECTED", "Missing or invalid CSRF token")
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new("PAYLOAD_TOO_LARGE", message)
    }

    /// 429 with the seconds to wait in `details.retry_after`
    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMITED",
            message,
            json!({ "retry_after": retry_after_secs.max(1) }),
        )
    }

    /// Logs the cause; the client only sees a generic message
    pub fn internal(error: impl std::fmt::Display) -> Self {
        tracing::error!(error = %error, "Request failed");
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" | "UPLOAD_REJECTED" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "CSRF_REJECTED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self
            .error
            .details
            .as_ref()
            .and_then(|d| d.get("retry_after"))
            .and_then(|v| v.as_u64());

        let mut response = (status, Json(self)).into_response();
        if let (StatusCode::TOO_MANY_REQUESTS, Some(secs)) = (status, retry_after) {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<ProjectServiceError> for ApiError {
    fn from(e: ProjectServiceError) -> Self {
        match e {
            ProjectServiceError::NotFound(what) => Self::not_found(format!("Project not found: {}", what)),
            ProjectServiceError::DuplicateSlug(slug) => {
                Self::conflict(format!("Project slug already exists: {}", slug))
            }
            ProjectServiceError::ValidationError(msg) => Self::validation_error(msg),
            ProjectServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<BlogServiceError> for ApiError {
    fn from(e: BlogServiceError) -> Self {
        match e {
            BlogServiceError::NotFound(what) => Self::not_found(format!("Post not found: {}", what)),
            BlogServiceError::DuplicateSlug(slug) => {
                Self::conflict(format!("Post slug already exists: {}", slug))
            }
            BlogServiceError::ValidationError(msg) => Self::validation_error(msg),
            BlogServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::NotFound(what) => Self::not_found(format!("Tag not found: {}", what)),
            TagServiceError::Conflict(name) => Self::conflict(format!("Tag already exists: {}", name)),
            TagServiceError::ValidationError(msg) => Self::validation_error(msg),
            TagServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound(what) => {
                Self::not_found(format!("Category not found: {}", what))
            }
            CategoryServiceError::DuplicateSlug(slug) => {
                Self::conflict(format!("Category slug already exists: {}", slug))
            }
            CategoryServiceError::ValidationError(msg) => Self::validation_error(msg),
            CategoryServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<ContactServiceError> for ApiError {
    fn from(e: ContactServiceError) -> Self {
        match e {
            ContactServiceError::NotFound(id) => Self::not_found(format!("Inquiry not found: {}", id)),
            ContactServiceError::ValidationError(msg) => Self::validation_error(msg),
            ContactServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<SubscriberServiceError> for ApiError {
    fn from(e: SubscriberServiceError) -> Self {
        match e {
            SubscriberServiceError::NotFound => Self::not_found("Subscriber not found"),
            SubscriberServiceError::ValidationError(msg) => Self::validation_error(msg),
            SubscriberServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<MediaServiceError> for ApiError {
    fn from(e: MediaServiceError) -> Self {
        match e {
            MediaServiceError::NotFound(id) => Self::not_found(format!("Media not found: {}", id)),
            MediaServiceError::ValidationError(msg) => Self::validation_error(msg),
            MediaServiceError::TooLarge { size, limit } => Self::with_details(
                "PAYLOAD_TOO_LARGE",
                "File is too large",
                json!({ "size": size, "limit": limit }),
            ),
            MediaServiceError::Rejected(findings) => Self::with_details(
                "UPLOAD_REJECTED",
                "The file was rejected by the upload scanner",
                json!({ "findings": findings.iter().map(ToString::to_string).collect::<Vec<_>>() }),
            ),
            MediaServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<ThemeServiceError> for ApiError {
    fn from(e: ThemeServiceError) -> Self {
        match e {
            ThemeServiceError::PresetNotFound(name) => {
                Self::not_found(format!("Theme preset not found: {}", name))
            }
            ThemeServiceError::ValidationError(msg) => Self::validation_error(msg),
            ThemeServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(e: SettingsServiceError) -> Self {
        match e {
            SettingsServiceError::InvalidValue(msg) => Self::validation_error(msg),
            SettingsServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<AnalyticsServiceError> for ApiError {
    fn from(e: AnalyticsServiceError) -> Self {
        match e {
            AnalyticsServiceError::ValidationError(msg) => Self::validation_error(msg),
            AnalyticsServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<GithubServiceError> for ApiError {
    fn from(e: GithubServiceError) -> Self {
        match e {
            GithubServiceError::NotFound(what) => {
                Self::not_found(format!("Repository not found: {}", what))
            }
            GithubServiceError::ValidationError(msg) => Self::validation_error(msg),
            GithubServiceError::Conflict(slug) => {
                Self::conflict(format!("Project already exists: {}", slug))
            }
            GithubServiceError::Upstream(msg) => Self::with_details(
                "UPSTREAM_ERROR",
                "GitHub request failed",
                json!({ "reason": msg }),
            ),
            GithubServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            UserServiceError::TooManyAttempts => Self::rate_limited(
                "Too many failed login attempts, try again later",
                (LOGIN_WINDOW_MINUTES * 60) as u64,
            ),
            UserServiceError::ValidationError(msg) => Self::validation_error(msg),
            UserServiceError::UserExists(what) => Self::conflict(format!("User already exists: {}", what)),
            UserServiceError::SetupCompleted => Self::forbidden("Setup has already been completed"),
            UserServiceError::Forbidden(msg) => Self::forbidden(msg),
            UserServiceError::NotFound => Self::not_found("User not found"),
            UserServiceError::InternalError(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", e))
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The token that authenticated the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    /// Sent as `Authorization: Bearer`; such requests skip the CSRF check
    pub bearer: bool,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Session token from the `Authorization: Bearer` header, else the
/// `session` cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<SessionToken> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(SessionToken {
            token: token.to_string(),
            bearer: true,
        });
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|c| c.trim().strip_prefix("session="))
        .find(|t| !t.is_empty())
        .map(|token| SessionToken {
            token: token.to_string(),
            bearer: false,
        })
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token.token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    request.extensions_mut().insert(token);
    Ok(next.run(request).await)
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Editor authorization middleware
pub async fn require_editor(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_editor() {
        return Err(ApiError::forbidden("Editor privileges required"));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// CSRF
// ============================================================================

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Cookie-authenticated writes must echo the session's CSRF token.
///
/// Runs after `require_auth`; bearer-token requests pass through.
pub async fn csrf_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_state_changing(request.method()) {
        return Ok(next.run(request).await);
    }

    let session = request
        .extensions()
        .get::<SessionToken>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    if session.bearer {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    if presented.is_empty() || !state.csrf.validate(&session.token, presented).await {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "CSRF check failed"
        );
        return Err(ApiError::csrf_rejected());
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Client identity and rate limiting
// ============================================================================

/// Client IP: `CF-Connecting-IP`, `X-Real-IP`, the first
/// `X-Forwarded-For` entry, then the socket address
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header_value("cf-connecting-ip")
        .or_else(|| header_value("x-real-ip"))
        .or_else(|| {
            header_value("x-forwarded-for").and_then(|v| {
                v.split(',')
                    .next()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        })
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn peer_addr(extensions: &axum::http::Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = client_ip(&parts.headers, peer_addr(&parts.extensions));
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        Ok(ClientInfo::new(ip, user_agent))
    }
}

fn limiter_key(request: &Request) -> String {
    client_ip(request.headers(), peer_addr(request.extensions()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn limit_response(decision: RateDecision, key: &str, path: &str, message: &str) -> Response {
    tracing::warn!(
        client = key,
        path,
        retry_after = decision.retry_after.as_secs(),
        "Rate limit exceeded"
    );
    ApiError::rate_limited(message, decision.retry_after.as_secs_f64().ceil() as u64).into_response()
}

/// Per-IP limit on the public API
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = limiter_key(&request);
    let decision = state.api_limiter.check(&key).await;
    if !decision.allowed {
        return limit_response(decision, &key, request.uri().path(), "Too many requests");
    }
    next.run(request).await
}

/// Per-IP limit on contact and subscribe submissions
pub async fn submission_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }
    let key = limiter_key(&request);
    let decision = state.contact_limiter.check(&key).await;
    if !decision.allowed {
        return limit_response(
            decision,
            &key,
            request.uri().path(),
            "Too many submissions, try again later",
        );
    }
    next.run(request).await
}

// ============================================================================
// Statistics and error persistence
// ============================================================================

/// Records request count and response time
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state
        .request_stats
        .record(start.elapsed().as_micros() as u64);
    response
}

/// Persists 5xx responses as `error` analytics events
pub async fn error_audit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = ClientInfo::new(
        client_ip(request.headers(), peer_addr(request.extensions())),
        request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string),
    );

    let response = next.run(request).await;

    let status = response.status();
    if status.is_server_error() {
        state
            .analytics_service
            .record_quietly(
                EventType::Error,
                &path,
                &client,
                Some(json!({ "method": method.as_str(), "status": status.as_u16() })),
            )
            .await;
    }
    response
}

// ============================================================================
// Conditional requests
// ============================================================================

/// Check if ETags match; weak and strong forms compare equal
pub fn etag_matches(request_etag: Option<&str>, response_etag: &str) -> bool {
    let normalized_response = response_etag.trim_start_matches("W/");
    match request_etag {
        Some(header) => header.split(',').map(str::trim).any(|etag| {
            etag == "*" || etag.trim_start_matches("W/") == normalized_response
        }),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let token = extract_session_token(&headers(&[("authorization", "Bearer abc")])).unwrap();
        assert_eq!(token.token, "abc");
        assert!(token.bearer);
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let token =
            extract_session_token(&headers(&[("cookie", "theme=dark; session=xyz")])).unwrap();
        assert_eq!(token.token, "xyz");
        assert!(!token.bearer);
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let token = extract_session_token(&headers(&[
            ("authorization", "Bearer bearer-token"),
            ("cookie", "session=cookie-token"),
        ]))
        .unwrap();
        assert_eq!(token.token, "bearer-token");
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        assert!(extract_session_token(&headers(&[("authorization", "Basic abc")])).is_none());
        assert!(extract_session_token(&headers(&[("cookie", "session=")])).is_none());
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        assert_eq!(
            client_ip(
                &headers(&[
                    ("x-forwarded-for", "198.51.100.7, 10.0.0.1"),
                    ("x-real-ip", "203.0.113.5"),
                    ("cf-connecting-ip", "192.0.2.1"),
                ]),
                Some(peer)
            )
            .as_deref(),
            Some("192.0.2.1")
        );
        assert_eq!(
            client_ip(
                &headers(&[("x-forwarded-for", "198.51.100.7, 10.0.0.1"), ("x-real-ip", "203.0.113.5")]),
                Some(peer)
            )
            .as_deref(),
            Some("203.0.113.5")
        );
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", "198.51.100.7, 10.0.0.1")]), Some(peer)).as_deref(),
            Some("198.51.100.7")
        );
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)).as_deref(), Some("10.0.0.9"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::new("UPLOAD_REJECTED", "x"), StatusCode::BAD_REQUEST),
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::csrf_rejected(), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (ApiError::payload_too_large("x"), StatusCode::PAYLOAD_TOO_LARGE),
            (ApiError::rate_limited("x", 3), StatusCode::TOO_MANY_REQUESTS),
            (ApiError::new("UPSTREAM_ERROR", "x"), StatusCode::BAD_GATEWAY),
            (ApiError::new("INTERNAL_ERROR", "x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{}", error.error.code);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::rate_limited("slow down", 42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");

        let response = ApiError::rate_limited("slow down", 0).into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }

    #[test]
    fn test_service_error_mapping() {
        let e: ApiError = ProjectServiceError::DuplicateSlug("folio".into()).into();
        assert_eq!(e.status(), StatusCode::CONFLICT);

        let e: ApiError = MediaServiceError::TooLarge { size: 10, limit: 5 }.into();
        assert_eq!(e.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let e: ApiError = UserServiceError::TooManyAttempts.into();
        assert_eq!(e.status(), StatusCode::TOO_MANY_REQUESTS);

        let e: ApiError = BlogServiceError::InternalError(anyhow::anyhow!("db gone")).into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!e.error.message.contains("db gone"));
    }

    #[test]
    fn test_etag_matches() {
        assert!(etag_matches(Some("\"12345\""), "\"12345\""));
        assert!(etag_matches(Some("W/\"12345\""), "\"12345\""));
        assert!(etag_matches(Some("\"a\", \"12345\""), "\"12345\""));
        assert!(etag_matches(Some("*"), "\"12345\""));
        assert!(!etag_matches(Some("\"54321\""), "\"12345\""));
        assert!(!etag_matches(None, "\"12345\""));
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(100);
        stats.record(300);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.avg_response_time_us(), 200.0);
    }
}
