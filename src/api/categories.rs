//! Category API endpoints
//!
//! - GET /api/v1/categories - Categories with published post counts
//! - GET/POST /api/v1/admin/categories
//! - PUT/DELETE /api/v1/admin/categories/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde_json::json;

use crate::api::common::audit;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(list_categories))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/{id}", put(update_category).delete(delete_category))
}

/// GET /api/v1/categories
async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryWithCount>>, ApiError> {
    Ok(Json(state.category_service.list().await?))
}

/// POST /api/v1/admin/categories
async fn create_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(body).await?;
    audit(&state, &user, "category.create", json!({ "id": category.id, "slug": category.slug })).await;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/v1/admin/categories/{id}
async fn update_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    let category = state.category_service.update(id, body).await?;
    audit(&state, &user, "category.update", json!({ "id": id })).await;
    Ok(Json(category))
}

/// DELETE /api/v1/admin/categories/{id} - posts stay, the link goes
async fn delete_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    audit(&state, &user, "category.delete", json!({ "id": id })).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::test_app;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_category_crud() {
        let app = test_app().await;
        let auth = app.editor().await.cookie();

        let (status, created) = app
            .send(
                Method::POST,
                "/api/v1/admin/categories",
                Some(json!({"name": "Notes", "description": "Short notes"})),
                Some(&auth),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["slug"], "notes");
        let id = created["id"].as_i64().unwrap();

        let (status, _) = app
            .send(
                Method::POST,
                "/api/v1/admin/categories",
                Some(json!({"name": "Notes"})),
                Some(&auth),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, updated) = app
            .send(
                Method::PUT,
                &format!("/api/v1/admin/categories/{}", id),
                Some(json!({"name": "Field Notes", "slug": "field-notes"})),
                Some(&auth),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["slug"], "field-notes");

        let (_, listed) = app.get("/api/v1/categories", None).await;
        assert_eq!(listed[0]["name"], "Field Notes");
        assert_eq!(listed[0]["post_count"], 0);

        let (status, _) = app
            .send(Method::DELETE, &format!("/api/v1/admin/categories/{}", id), None, Some(&auth))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, listed) = app.get("/api/v1/categories", None).await;
        assert!(listed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_public_cannot_create() {
        let app = test_app().await;
        let (status, _) = app
            .send(Method::POST, "/api/v1/categories", Some(json!({"name": "x"})), None)
            .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
