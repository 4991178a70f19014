//! Newsletter subscription endpoints
//!
//! Public:
//! - POST /api/v1/subscribe - Start a subscription, mails a confirmation link
//!   (submission rate limited)
//! - POST /api/v1/subscribe/confirm
//! - POST /api/v1/unsubscribe
//!
//! Admin:
//! - GET /api/v1/admin/subscribers
//! - GET /api/v1/admin/subscribers/export - CSV download
//! - DELETE /api/v1/admin/subscribers/{id}

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::common::{audit, default_page, default_per_page, ListResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ListParams, Subscriber, SubscriberStatus};
use crate::services::analytics::ClientInfo;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ListSubscribersQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<SubscriberStatus>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub email: String,
    pub status: SubscriberStatus,
}

impl From<Subscriber> for SubscriptionResponse {
    fn from(s: Subscriber) -> Self {
        Self {
            email: s.email,
            status: s.status,
        }
    }
}

pub fn submit_router() -> Router<AppState> {
    Router::new().route("/subscribe", post(subscribe))
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/subscribe/confirm", post(confirm))
        .route("/unsubscribe", post(unsubscribe))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subscribers))
        .route("/export", get(export_csv))
        .route("/{id}", delete(delete_subscriber))
}

/// POST /api/v1/subscribe
async fn subscribe(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), ApiError> {
    let subscriber = state
        .subscriber_service
        .subscribe(&body.email, body.name.as_deref(), &client)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(subscriber.into())))
}

/// POST /api/v1/subscribe/confirm
async fn confirm(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    Ok(Json(
        state.subscriber_service.confirm(&body.token).await?.into(),
    ))
}

/// POST /api/v1/unsubscribe
async fn unsubscribe(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    Ok(Json(
        state.subscriber_service.unsubscribe(&body.token).await?.into(),
    ))
}

/// GET /api/v1/admin/subscribers
async fn list_subscribers(
    State(state): State<AppState>,
    Query(query): Query<ListSubscribersQuery>,
) -> Result<Json<ListResponse<Subscriber>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(
        state
            .subscriber_service
            .list(query.status, &params)
            .await?
            .into(),
    ))
}

/// GET /api/v1/admin/subscribers/export
async fn export_csv(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let csv = state.subscriber_service.export_csv().await?;
    let filename = format!("subscribers-{}.csv", chrono::Utc::now().format("%Y%m%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    ))
}

/// DELETE /api/v1/admin/subscribers/{id}
async fn delete_subscriber(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.subscriber_service.delete(id).await?;
    audit(&state, &user, "subscriber.delete", json!({ "id": id })).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{test_app, TestApp};
    use crate::services::email::templates;
    use axum::http::{header, Method, StatusCode};
    use serde_json::json;

    /// Token from the newest confirmation mail
    async fn mailed_token(app: &TestApp) -> String {
        let outbox = app.state.email_service.outbox().await;
        let mail = outbox
            .iter()
            .rev()
            .find(|m| m.template == templates::SUBSCRIPTION_CONFIRM)
            .unwrap();
        let start = mail.email.text.find("token=").unwrap() + "token=".len();
        let raw: String = mail.email.text[start..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .collect();
        urlencoding::decode(&raw).unwrap().into_owned()
    }

    #[tokio::test]
    async fn test_subscribe_confirm_unsubscribe() {
        let app = test_app().await;

        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/subscribe",
                Some(json!({"email": "  Reader@Example.com ", "name": "Reader"})),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["email"], "reader@example.com");
        assert_eq!(body["status"], "pending");
        assert!(body.get("token").is_none());

        let token = mailed_token(&app).await;
        let (status, body) = app
            .send(Method::POST, "/api/v1/subscribe/confirm", Some(json!({"token": token})), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "active");

        let (status, body) = app
            .send(Method::POST, "/api/v1/subscribe", Some(json!({"email": "reader@example.com"})), None)
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "active");

        let (status, body) = app
            .send(Method::POST, "/api/v1/unsubscribe", Some(json!({"token": token})), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "unsubscribed");
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let app = test_app().await;
        let (status, _) = app
            .send(Method::POST, "/api/v1/subscribe/confirm", Some(json!({"token": "nope"})), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_list_export_delete() {
        let app = test_app().await;
        for email in ["a@example.com", "b@example.com"] {
            app.send(Method::POST, "/api/v1/subscribe", Some(json!({"email": email})), None)
                .await;
        }
        let auth = app.editor().await.bearer();

        let (_, listed) = app
            .get("/api/v1/admin/subscribers?status=pending", Some(&auth))
            .await;
        assert_eq!(listed["total"], 2);

        let (status, headers, body) = app
            .raw(TestApp::request(
                Method::GET,
                "/api/v1/admin/subscribers/export",
                None,
                Some(&auth),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment"));
        let csv = String::from_utf8(body.to_vec()).unwrap();
        assert!(csv.starts_with("email,name,status"));
        assert_eq!(csv.lines().count(), 3);

        let id = listed["items"][0]["id"].as_i64().unwrap();
        let (status, _) = app
            .send(Method::DELETE, &format!("/api/v1/admin/subscribers/{}", id), None, Some(&auth))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, listed) = app.get("/api/v1/admin/subscribers", Some(&auth)).await;
        assert_eq!(listed["total"], 1);
    }
}
