//! Blog post repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{decode_enum, like_pattern};
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{BlogPost, ContentStatus, ListParams, PostFilter};

impl_from_row!(BlogPost, |row| {
    Ok(BlogPost {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        excerpt: row.try_get("excerpt")?,
        content: row.try_get("content")?,
        content_html: row.try_get("content_html")?,
        author_id: row.try_get("author_id")?,
        status: decode_enum::<ContentStatus>("status", row.try_get("status")?)?,
        featured: row.try_get("featured")?,
        cover_image: row.try_get("cover_image")?,
        reading_time_minutes: row.try_get("reading_time_minutes")?,
        view_count: row.try_get("view_count")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        tags: Vec::new(),
        categories: Vec::new(),
    })
});

const POST_COLUMNS: &str = "b.id, b.slug, b.title, b.excerpt, b.content, b.content_html, \
    b.author_id, b.status, b.featured, b.cover_image, b.reading_time_minutes, b.view_count, \
    b.published_at, b.created_at, b.updated_at";

const POST_FILTER: &str = r#"
    WHERE (? IS NULL OR b.status = ?)
      AND (? IS NULL OR b.featured = ?)
      AND (? IS NULL OR EXISTS (
            SELECT 1 FROM post_tags bt
            INNER JOIN tags t ON t.id = bt.tag_id
            WHERE bt.post_id = b.id AND t.slug = ?))
      AND (? IS NULL OR EXISTS (
            SELECT 1 FROM post_categories pc
            INNER JOIN categories c ON c.id = pc.category_id
            WHERE pc.post_id = b.id AND c.slug = ?))
      AND (? IS NULL OR b.title LIKE ? ESCAPE '!' OR b.excerpt LIKE ? ESCAPE '!'
            OR b.content LIKE ? ESCAPE '!')
"#;

#[async_trait]
pub trait BlogPostRepository: Send + Sync {
    async fn create(&self, post: &BlogPost) -> Result<BlogPost>;

    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>>;

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Newest publication first; drafts (no publication date) after, newest first
    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<(Vec<BlogPost>, i64)>;

    async fn update(&self, post: &BlogPost) -> Result<BlogPost>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn increment_views(&self, id: i64) -> Result<()>;

    async fn count(&self, status: Option<ContentStatus>) -> Result<i64>;
}

pub struct SqlxBlogPostRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogPostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BlogPostRepository for SqlxBlogPostRepository {
    async fn create(&self, post: &BlogPost) -> Result<BlogPost> {
        let now = Utc::now();
        let id = on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO blog_posts (slug, title, excerpt, content, content_html, author_id,
                    status, featured, cover_image, reading_time_minutes, view_count,
                    published_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
                "#,
            )
            .bind(&post.slug)
            .bind(&post.title)
            .bind(&post.excerpt)
            .bind(&post.content)
            .bind(&post.content_html)
            .bind(post.author_id)
            .bind(post.status.as_str())
            .bind(post.featured)
            .bind(&post.cover_image)
            .bind(post.reading_time_minutes)
            .bind(post.published_at)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create blog post")?
            .insert_id()
        });

        Ok(BlogPost {
            id,
            view_count: 0,
            created_at: now,
            updated_at: now,
            ..post.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>> {
        let sql = format!("SELECT {} FROM blog_posts b WHERE b.id = ?", POST_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, BlogPost>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get blog post by id")
        })
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        let sql = format!("SELECT {} FROM blog_posts b WHERE b.slug = ?", POST_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, BlogPost>(&sql)
                .bind(slug)
                .fetch_optional(conn)
                .await
                .context("Failed to get blog post by slug")
        })
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = on_pool!(self.pool, |conn| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM blog_posts WHERE slug = ? AND (? IS NULL OR id <> ?)",
            )
            .bind(slug)
            .bind(exclude_id)
            .bind(exclude_id)
            .fetch_one(conn)
            .await
            .context("Failed to check blog post slug")?
        });
        Ok(count > 0)
    }

    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<(Vec<BlogPost>, i64)> {
        let status = filter.status.map(|s| s.as_str());
        let keyword = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(like_pattern);
        let list_sql = format!(
            "SELECT {} FROM blog_posts b {} \
             ORDER BY CASE WHEN b.published_at IS NULL THEN 1 ELSE 0 END, \
             b.published_at DESC, b.created_at DESC, b.id DESC \
             LIMIT ? OFFSET ?",
            POST_COLUMNS, POST_FILTER
        );
        let count_sql = format!("SELECT COUNT(*) FROM blog_posts b {}", POST_FILTER);

        // Parameters are repeated because each predicate tests for NULL first.
        macro_rules! bind_filter {
            ($query:expr) => {
                $query
                    .bind(status)
                    .bind(status)
                    .bind(filter.featured)
                    .bind(filter.featured)
                    .bind(&filter.tag)
                    .bind(&filter.tag)
                    .bind(&filter.category)
                    .bind(&filter.category)
                    .bind(&keyword)
                    .bind(&keyword)
                    .bind(&keyword)
                    .bind(&keyword)
            };
        }

        on_pool!(self.pool, |conn| {
            let items = bind_filter!(sqlx::query_as::<_, BlogPost>(&list_sql))
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list blog posts")?;
            let total = bind_filter!(sqlx::query_scalar::<_, i64>(&count_sql))
                .fetch_one(conn)
                .await
                .context("Failed to count blog posts")?;
            Ok((items, total))
        })
    }

    async fn update(&self, post: &BlogPost) -> Result<BlogPost> {
        let now = Utc::now();
        on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE blog_posts
                SET slug = ?, title = ?, excerpt = ?, content = ?, content_html = ?, status = ?,
                    featured = ?, cover_image = ?, reading_time_minutes = ?, published_at = ?,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&post.slug)
            .bind(&post.title)
            .bind(&post.excerpt)
            .bind(&post.content)
            .bind(&post.content_html)
            .bind(post.status.as_str())
            .bind(post.featured)
            .bind(&post.cover_image)
            .bind(post.reading_time_minutes)
            .bind(post.published_at)
            .bind(now)
            .bind(post.id)
            .execute(conn)
            .await
            .context("Failed to update blog post")?;
        });

        Ok(BlogPost {
            updated_at: now,
            ..post.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM blog_posts WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete blog post")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        on_pool!(self.pool, |conn| {
            sqlx::query("UPDATE blog_posts SET view_count = view_count + 1 WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to increment view count")?;
        });
        Ok(())
    }

    async fn count(&self, status: Option<ContentStatus>) -> Result<i64> {
        let status = status.map(|s| s.as_str());
        on_pool!(self.pool, |conn| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM blog_posts WHERE (? IS NULL OR status = ?)",
            )
            .bind(status)
            .bind(status)
            .fetch_one(conn)
            .await
            .context("Failed to count blog posts")
        })
    }
}
