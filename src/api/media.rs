//! Media library endpoints
//!
//! - GET  /api/v1/admin/media - Uploaded files, newest first
//! - POST /api/v1/admin/media - multipart/form-data, one file in field "file"
//! - GET/DELETE /api/v1/admin/media/{id}
//!
//! Stored files are served from `/uploads`.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::api::common::{audit, ListResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Media;
use crate::services::analytics::ClientInfo;
use crate::services::media::UploadedFile;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn admin_router(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);
    Router::new()
        .route("/", get(list_media).post(upload_media))
        .route("/{id}", get(get_media).delete(delete_media))
        .layer(DefaultBodyLimit::max(body_limit))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Upload exceeds the size limit")
    } else {
        ApiError::validation_error(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// GET /api/v1/admin/media
async fn list_media(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Media>>, ApiError> {
    Ok(Json(state.media_service.list(&query.params()).await?.into()))
}

/// POST /api/v1/admin/media
async fn upload_media(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Media>), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let media = state
            .media_service
            .upload(
                UploadedFile {
                    original_name,
                    content_type,
                    bytes: bytes.to_vec(),
                },
                Some(user.0.id),
                &client,
            )
            .await?;
        audit(&state, &user, "media.upload", json!({ "id": media.id, "filename": media.filename })).await;
        return Ok((StatusCode::CREATED, Json(media)));
    }

    Err(ApiError::validation_error("Missing multipart field 'file'"))
}

/// GET /api/v1/admin/media/{id}
async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Media>, ApiError> {
    Ok(Json(state.media_service.get(id).await?))
}

/// DELETE /api/v1/admin/media/{id} - removes the stored file too
async fn delete_media(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.media_service.delete(id).await?;
    audit(&state, &user, "media.delete", json!({ "id": id })).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{test_app, test_app_with, Auth, TestApp};
    use crate::models::EventType;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    const BOUNDARY: &str = "folio-test-boundary";

    fn upload_request(auth: &Auth, filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let mut request = TestApp::request(Method::POST, "/api/v1/admin/media", None, Some(auth));
        request.headers_mut().insert(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY).parse().unwrap(),
        );
        *request.body_mut() = Body::from(body);
        request
    }

    #[tokio::test]
    async fn test_upload_list_delete() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();

        let (status, _, body) = app.raw(upload_request(&auth, "logo.png", "image/png", PNG)).await;
        assert_eq!(status, StatusCode::CREATED);
        let media: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(media["original_name"], "logo.png");
        let filename = media["filename"].as_str().unwrap();
        let stored = app.state.config.upload.path.join(filename);
        assert!(stored.exists());

        let (status, served, bytes) = app
            .raw(TestApp::request(
                Method::GET,
                media["url"].as_str().unwrap(),
                None,
                None,
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(served[header::CONTENT_TYPE], "image/png");
        assert_eq!(&bytes[..], PNG);

        let (_, listed) = app.get("/api/v1/admin/media", Some(&auth)).await;
        assert_eq!(listed["total"], 1);

        let id = media["id"].as_i64().unwrap();
        let (status, _) = app
            .send(Method::DELETE, &format!("/api/v1/admin/media/{}", id), None, Some(&auth))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!stored.exists());
    }

    #[tokio::test]
    async fn test_disguised_upload_rejected_and_recorded() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();

        let (status, _, body) = app
            .raw(upload_request(&auth, "cat.png", "image/png", b"<script>alert(1)</script>"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error"]["code"], "UPLOAD_REJECTED");
        assert!(!error["error"]["details"]["findings"].as_array().unwrap().is_empty());

        let events = app
            .state
            .analytics_service
            .recent(Some(EventType::UploadRejected), 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_upload() {
        let app = test_app_with(|config| config.upload.max_file_size = 8).await;
        let auth = app.editor().await.bearer();
        let (status, _, body) = app.raw(upload_request(&auth, "logo.png", "image/png", PNG)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error"]["details"]["limit"], 8);
    }

    #[tokio::test]
    async fn test_disallowed_type() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();
        let (status, _, _) = app
            .raw(upload_request(&auth, "notes.txt", "text/plain", b"hello"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
