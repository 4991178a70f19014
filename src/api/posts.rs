//! Blog API endpoints
//!
//! Public:
//! - GET /api/v1/posts - Published posts with tag, category and keyword filters
//! - GET /api/v1/posts/{slug} - One published post; counts a view
//! - GET /api/v1/feed.xml - RSS feed
//!
//! Admin:
//! - GET/POST /api/v1/admin/posts
//! - GET/PUT/DELETE /api/v1/admin/posts/{id}

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::common::{audit, default_page, ListResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{BlogPost, ContentStatus, CreatePostInput, ListParams, PostFilter, UpdatePostInput};
use crate::services::blog::FeedChannel;

const FEED_ITEMS: usize = 20;

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    /// Defaults to the site's `posts_per_page`
    pub per_page: Option<u32>,
    pub status: Option<ContentStatus>,
    pub tag: Option<String>,
    pub category: Option<String>,
    pub q: Option<String>,
    pub featured: Option<bool>,
}

impl ListPostsQuery {
    fn filter(&self) -> PostFilter {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        PostFilter {
            status: self.status,
            tag: non_empty(&self.tag),
            category: non_empty(&self.category),
            q: non_empty(&self.q),
            featured: self.featured,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(flatten)]
    pub post: CreatePostInput,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    #[serde(flatten)]
    pub post: UpdatePostInput,
    pub tags: Option<Vec<String>>,
    pub category_ids: Option<Vec<i64>>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published))
        .route("/{slug}", get(get_published))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all).post(create_post))
        .route("/{id}", get(get_post).put(update_post).delete(delete_post))
}

async fn page_size(state: &AppState, requested: Option<u32>) -> Result<u32, ApiError> {
    match requested {
        Some(n) => Ok(n),
        None => Ok(state.settings_service.get_site_settings().await?.posts_per_page),
    }
}

/// GET /api/v1/posts
async fn list_published(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<ListResponse<BlogPost>>, ApiError> {
    let params = ListParams::new(query.page, page_size(&state, query.per_page).await?);
    let result = state
        .blog_service
        .list_published(&query.filter(), &params)
        .await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/posts/{slug}
async fn get_published(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BlogPost>, ApiError> {
    let mut post = state.blog_service.get_published_by_slug(&slug).await?;
    match state.blog_service.increment_views(post.id).await {
        Ok(()) => post.view_count += 1,
        Err(e) => tracing::warn!(post_id = post.id, error = %e, "Failed to count post view"),
    }
    Ok(Json(post))
}

/// GET /api/v1/feed.xml
pub async fn feed(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let site = state.settings_service.get_site_settings().await?;
    let title = if site.owner_name.trim().is_empty() {
        "Blog".to_string()
    } else {
        format!("{} - Blog", site.owner_name.trim())
    };
    let channel = FeedChannel {
        title,
        description: site.meta_description,
        link: state.config.server.public_url.trim_end_matches('/').to_string(),
    };
    let xml = state.blog_service.feed(&channel, FEED_ITEMS).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/rss+xml; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=600"),
        ],
        xml,
    ))
}

/// GET /api/v1/admin/posts
async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<ListResponse<BlogPost>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page.unwrap_or(20));
    Ok(Json(state.blog_service.list(&query.filter(), &params).await?.into()))
}

/// POST /api/v1/admin/posts - the caller is the author
async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<BlogPost>), ApiError> {
    let post = state
        .blog_service
        .create(user.0.id, body.post, &body.tags, &body.category_ids)
        .await?;
    audit(&state, &user, "post.create", json!({ "id": post.id, "slug": post.slug })).await;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /api/v1/admin/posts/{id}
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BlogPost>, ApiError> {
    Ok(Json(state.blog_service.get_by_id(id).await?))
}

/// PUT /api/v1/admin/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePostRequest>,
) -> Result<Json<BlogPost>, ApiError> {
    let post = state
        .blog_service
        .update(
            id,
            body.post,
            body.tags.as_deref(),
            body.category_ids.as_deref(),
        )
        .await?;
    audit(&state, &user, "post.update", json!({ "id": id })).await;
    Ok(Json(post))
}

/// DELETE /api/v1/admin/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.blog_service.delete(id).await?;
    audit(&state, &user, "post.delete", json!({ "id": id })).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{test_app, TestApp};
    use axum::http::{header, Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_post_lifecycle_and_views() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();

        let (status, category) = app
            .send(
                Method::POST,
                "/api/v1/admin/categories",
                Some(json!({"name": "Engineering"})),
                Some(&auth),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, post) = app
            .send(
                Method::POST,
                "/api/v1/admin/posts",
                Some(json!({
                    "title": "Hello World",
                    "content": "First post with some words in it.",
                    "status": "published",
                    "tags": ["intro"],
                    "category_ids": [category["id"]]
                })),
                Some(&auth),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(post["slug"], "hello-world");
        assert_eq!(post["categories"][0]["name"], "Engineering");

        let (status, first) = app.get("/api/v1/posts/hello-world", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["view_count"], 1);

        let (_, listed) = app.get("/api/v1/posts?tag=intro", None).await;
        assert_eq!(listed["total"], 1);
        let (_, listed) = app.get("/api/v1/posts?category=engineering", None).await;
        assert_eq!(listed["total"], 1);
        let (_, listed) = app.get("/api/v1/posts?q=words", None).await;
        assert_eq!(listed["total"], 1);
        let (_, listed) = app.get("/api/v1/posts?q=absent", None).await;
        assert_eq!(listed["total"], 0);

        let id = post["id"].as_i64().unwrap();
        let (status, _) = app
            .send(Method::DELETE, &format!("/api/v1/admin/posts/{}", id), None, Some(&auth))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.get("/api/v1/posts/hello-world", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_drafts_hidden_from_public() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();
        app.send(
            Method::POST,
            "/api/v1/admin/posts",
            Some(json!({"title": "Draft", "content": "Not yet"})),
            Some(&auth),
        )
        .await;

        let (_, public) = app.get("/api/v1/posts", None).await;
        assert_eq!(public["total"], 0);
        let (_, admin) = app.get("/api/v1/admin/posts", Some(&auth)).await;
        assert_eq!(admin["total"], 1);
        let (status, _) = app.get("/api/v1/posts/draft", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_category_is_validation_error() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();
        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/admin/posts",
                Some(json!({"title": "T", "content": "Body", "category_ids": [999]})),
                Some(&auth),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_feed() {
        let app = test_app().await;
        let auth = app.editor().await.bearer();
        app.send(
            Method::POST,
            "/api/v1/admin/posts",
            Some(json!({"title": "Fish & Chips", "content": "Tasty", "status": "published"})),
            Some(&auth),
        )
        .await;

        let (status, headers, body) = app
            .raw(TestApp::request(Method::GET, "/api/v1/feed.xml", None, None))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("application/rss+xml"));
        let xml = String::from_utf8(body.to_vec()).unwrap();
        assert!(xml.contains("<rss"));
        assert!(xml.contains("Fish &amp; Chips"));
        assert!(xml.contains("/blog/fish-chips"));
    }
}
