//! Analytics endpoints
//!
//! - POST /api/v1/analytics/track - Browser beacon for view events
//! - GET  /api/v1/admin/analytics/summary?days=30
//! - GET  /api/v1/admin/analytics/events?kind=&limit=50

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{AnalyticsEvent, AnalyticsSummary, EventType};
use crate::services::analytics::ClientInfo;

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub kind: EventType,
    pub path: String,
    pub referrer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    30
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub kind: Option<EventType>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/track", post(track))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/events", get(events))
}

/// POST /api/v1/analytics/track
async fn track(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<TrackRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .analytics_service
        .track(body.kind, &body.path, body.referrer.as_deref(), &client)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/analytics/summary
async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    Ok(Json(state.analytics_service.summary(query.days).await?))
}

/// GET /api/v1/admin/analytics/events
async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<AnalyticsEvent>>, ApiError> {
    Ok(Json(
        state
            .analytics_service
            .recent(query.kind, query.limit)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{test_app, test_app_with, TestApp};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_track_and_summarize() {
        let app = test_app().await;
        for path in ["/", "/", "/blog"] {
            let mut request = TestApp::request(
                Method::POST,
                "/api/v1/analytics/track",
                Some(&json!({"kind": "page_view", "path": path, "referrer": "https://news.example"})),
                None,
            );
            request
                .headers_mut()
                .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
            let (status, _, _) = app.raw(request).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }

        let auth = app.editor().await.bearer();
        let (status, summary) = app
            .get("/api/v1/admin/analytics/summary?days=7", Some(&auth))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["totals"]["page_view"], 3);
        assert_eq!(summary["unique_visitors"], 1);
        assert_eq!(summary["top_paths"][0]["key"], "/");
        assert_eq!(summary["top_paths"][0]["count"], 2);
        assert_eq!(summary["daily_page_views"].as_array().unwrap().len(), 7);

        let (_, events) = app
            .get("/api/v1/admin/analytics/events?kind=page_view&limit=2", Some(&auth))
            .await;
        let events = events.as_array().unwrap();
        assert_eq!(events.len(), 2);
        let raw = serde_json::to_string(events).unwrap();
        assert!(!raw.contains("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_only_view_events_trackable() {
        let app = test_app().await;
        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/analytics/track",
                Some(json!({"kind": "audit", "path": "/"})),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_summary_rejects_bad_window() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();
        let (status, _) = app
            .get("/api/v1/admin/analytics/summary?days=0", Some(&auth))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disabled_analytics_accepts_beacon() {
        let app = test_app_with(|config| config.analytics.enabled = false).await;
        let request = TestApp::request(
            Method::POST,
            "/api/v1/analytics/track",
            Some(&json!({"kind": "post_view", "path": "/blog/x"})),
            None,
        );
        let (status, _, _) = app.raw(request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let events = app.state.analytics_service.recent(None, 10).await.unwrap();
        assert!(events.is_empty());
    }
}
