//! API layer - HTTP handlers and routing
//!
//! Everything lives under `/api/v1`. Routes fall into four groups:
//! - public: rate limited per client IP; contact and subscribe submissions
//!   have a stricter limit of their own
//! - authenticated: `/auth` session endpoints
//! - editor: `/admin` content management
//! - admin only: theme writes, site settings and user accounts
//!
//! Every authenticated group goes through `require_auth` and `csrf_guard`.

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod categories;
pub mod common;
pub mod contact;
pub mod media;
pub mod middleware;
pub mod posts;
pub mod projects;
pub mod site;
pub mod subscribers;
pub mod tags;
pub mod theme;

#[cfg(test)]
mod test_support;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, RequestStats};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Route layers run last-added first: auth, then role, then CSRF.
    let admin_routes = Router::new()
        .nest("/admin/theme", theme::admin_router())
        .nest("/admin/settings", site::admin_router())
        .nest("/admin/users", admin::users_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf_guard,
        ))
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let editor_routes = Router::new()
        .nest("/admin", admin::editor_router())
        .nest("/admin/projects", projects::admin_router())
        .nest("/admin/posts", posts::admin_router())
        .nest("/admin/categories", categories::admin_router())
        .nest("/admin/tags", tags::admin_router())
        .nest("/admin/inquiries", contact::admin_router())
        .nest("/admin/subscribers", subscribers::admin_router())
        .nest(
            "/admin/media",
            media::admin_router(state.config.upload.max_file_size),
        )
        .nest("/admin/analytics", analytics::admin_router())
        .nest("/admin/theme", theme::editor_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf_guard,
        ))
        .route_layer(axum_middleware::from_fn(middleware::require_editor))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let session_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf_guard,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let submission_routes = Router::new()
        .merge(contact::submit_router())
        .merge(subscribers::submit_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::submission_rate_limit,
        ));

    let public_routes = Router::new()
        .merge(site::public_router())
        .nest("/projects", projects::public_router())
        .nest("/posts", posts::public_router())
        .route("/feed.xml", get(posts::feed))
        .nest("/tags", tags::public_router())
        .nest("/categories", categories::public_router())
        .nest("/theme", theme::public_router())
        .route("/theme.css", get(theme::theme_css))
        .merge(subscribers::public_router())
        .nest("/analytics", analytics::public_router())
        .nest("/auth", auth::public_router())
        .merge(submission_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::rate_limit,
        ));

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(editor_routes)
        .merge(admin_routes)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(middleware::CSRF_HEADER),
        ]);

    let origin = origin.trim();
    if origin == "*" {
        // Credentials cannot be combined with a wildcard origin.
        return layer.allow_origin(AllowOrigin::any());
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value).allow_credentials(true),
        Err(e) => {
            tracing::warn!(origin, error = %e, "Invalid server.cors_origin, cross-origin requests disabled");
            layer
        }
    }
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// Build the complete application router with middleware
pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config.upload.path);

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest_service("/uploads", uploads)
        .fallback(route_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::error_audit_middleware,
        ))
        .layer(cors_layer(&state.config.server.cors_origin))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::test_support::{test_app, test_app_with, TestApp};
    use axum::http::{header, Method, StatusCode};

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let app = test_app().await;
        let (status, body) = app.get("/api/v1/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_public_rate_limit() {
        let app = test_app_with(|config| {
            config.security.rate_limit.max_requests = 3;
        })
        .await;
        for _ in 0..3 {
            let (status, _) = app.get("/api/v1/site", None).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, headers, _) = app
            .raw(TestApp::request(Method::GET, "/api/v1/site", None, None))
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(headers.get(header::RETRY_AFTER).is_some());
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let app = test_app_with(|config| {
            config.server.cors_origin = "https://jane.example".to_string();
        })
        .await;
        let mut request = TestApp::request(Method::OPTIONS, "/api/v1/projects", None, None);
        let headers = request.headers_mut();
        headers.insert(header::ORIGIN, "https://jane.example".parse().unwrap());
        headers.insert(header::ACCESS_CONTROL_REQUEST_METHOD, "POST".parse().unwrap());
        let (_, headers, _) = app.raw(request).await;
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://jane.example"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_database_failure_hides_details() {
        let app = test_app().await;
        app.state.pool.close().await;

        let (status, body) = app.get("/api/v1/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["database"], "unreachable");

        let (status, body) = app.get("/api/v1/site", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "Internal server error");
    }
}
