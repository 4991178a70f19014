//! Project repository
//!
//! Projects and their gallery images. Tag links live in the tag repository.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{decode_enum, join_list, split_list};
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{ContentStatus, ListParams, Project, ProjectFilter, ProjectImage};

impl_from_row!(Project, |row| {
    let tech_stack: String = row.try_get("tech_stack")?;
    Ok(Project {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        description: row.try_get("description")?,
        description_html: row.try_get("description_html")?,
        status: decode_enum::<ContentStatus>("status", row.try_get("status")?)?,
        featured: row.try_get("featured")?,
        sort_order: row.try_get("sort_order")?,
        repo_url: row.try_get("repo_url")?,
        live_url: row.try_get("live_url")?,
        cover_image: row.try_get("cover_image")?,
        tech_stack: split_list(&tech_stack),
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        tags: Vec::new(),
        images: Vec::new(),
    })
});

impl_from_row!(ProjectImage, |row| {
    Ok(ProjectImage {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        url: row.try_get("url")?,
        alt_text: row.try_get("alt_text")?,
        caption: row.try_get("caption")?,
        sort_order: row.try_get("sort_order")?,
        created_at: row.try_get("created_at")?,
    })
});

const PROJECT_COLUMNS: &str = "p.id, p.slug, p.title, p.summary, p.description, \
    p.description_html, p.status, p.featured, p.sort_order, p.repo_url, p.live_url, \
    p.cover_image, p.tech_stack, p.started_at, p.completed_at, p.published_at, \
    p.created_at, p.updated_at";

const IMAGE_COLUMNS: &str = "id, project_id, url, alt_text, caption, sort_order, created_at";

// Every filter is optional; a NULL parameter disables its predicate.
const PROJECT_FILTER: &str = r#"
    WHERE (? IS NULL OR p.status = ?)
      AND (? IS NULL OR p.featured = ?)
      AND (? IS NULL OR EXISTS (
            SELECT 1 FROM project_tags pt
            INNER JOIN tags t ON t.id = pt.tag_id
            WHERE pt.project_id = p.id AND t.slug = ?))
"#;

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> Result<Project>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Project>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Project>>;

    /// Whether another project already uses `slug`
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Featured first, then manual order, then newest publication
    async fn list(&self, filter: &ProjectFilter, params: &ListParams) -> Result<(Vec<Project>, i64)>;

    async fn update(&self, project: &Project) -> Result<Project>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Set `sort_order` to each id's position in `ids`
    async fn reorder(&self, ids: &[i64]) -> Result<()>;

    async fn count(&self, status: Option<ContentStatus>) -> Result<i64>;

    async fn add_image(&self, image: &ProjectImage) -> Result<ProjectImage>;

    async fn list_images(&self, project_id: i64) -> Result<Vec<ProjectImage>>;

    /// Remove an image only if it belongs to the project
    async fn delete_image(&self, project_id: i64, image_id: i64) -> Result<bool>;

    async fn reorder_images(&self, project_id: i64, image_ids: &[i64]) -> Result<()>;
}

pub struct SqlxProjectRepository {
    pool: DynDatabasePool,
}

impl SqlxProjectRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProjectRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProjectRepository for SqlxProjectRepository {
    async fn create(&self, project: &Project) -> Result<Project> {
        let now = Utc::now();
        let tech_stack = join_list(&project.tech_stack);
        let id = on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO projects (slug, title, summary, description, description_html, status,
                    featured, sort_order, repo_url, live_url, cover_image, tech_stack,
                    started_at, completed_at, published_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&project.slug)
            .bind(&project.title)
            .bind(&project.summary)
            .bind(&project.description)
            .bind(&project.description_html)
            .bind(project.status.as_str())
            .bind(project.featured)
            .bind(project.sort_order)
            .bind(&project.repo_url)
            .bind(&project.live_url)
            .bind(&project.cover_image)
            .bind(&tech_stack)
            .bind(project.started_at)
            .bind(project.completed_at)
            .bind(project.published_at)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create project")?
            .insert_id()
        });

        Ok(Project {
            id,
            created_at: now,
            updated_at: now,
            ..project.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects p WHERE p.id = ?", PROJECT_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Project>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get project by id")
        })
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects p WHERE p.slug = ?", PROJECT_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Project>(&sql)
                .bind(slug)
                .fetch_optional(conn)
                .await
                .context("Failed to get project by slug")
        })
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = on_pool!(self.pool, |conn| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM projects WHERE slug = ? AND (? IS NULL OR id <> ?)",
            )
            .bind(slug)
            .bind(exclude_id)
            .bind(exclude_id)
            .fetch_one(conn)
            .await
            .context("Failed to check project slug")?
        });
        Ok(count > 0)
    }

    async fn list(&self, filter: &ProjectFilter, params: &ListParams) -> Result<(Vec<Project>, i64)> {
        let status = filter.status.map(|s| s.as_str());
        let list_sql = format!(
            "SELECT {} FROM projects p {} \
             ORDER BY p.featured DESC, p.sort_order ASC, p.published_at DESC, p.id DESC \
             LIMIT ? OFFSET ?",
            PROJECT_COLUMNS, PROJECT_FILTER
        );
        let count_sql = format!("SELECT COUNT(*) FROM projects p {}", PROJECT_FILTER);

        on_pool!(self.pool, |conn| {
            let items = sqlx::query_as::<_, Project>(&list_sql)
                .bind(status)
                .bind(status)
                .bind(filter.featured)
                .bind(filter.featured)
                .bind(&filter.tag)
                .bind(&filter.tag)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list projects")?;
            let total = sqlx::query_scalar::<_, i64>(&count_sql)
                .bind(status)
                .bind(status)
                .bind(filter.featured)
                .bind(filter.featured)
                .bind(&filter.tag)
                .bind(&filter.tag)
                .fetch_one(conn)
                .await
                .context("Failed to count projects")?;
            Ok((items, total))
        })
    }

    async fn update(&self, project: &Project) -> Result<Project> {
        let now = Utc::now();
        let tech_stack = join_list(&project.tech_stack);
        on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE projects
                SET slug = ?, title = ?, summary = ?, description = ?, description_html = ?,
                    status = ?, featured = ?, sort_order = ?, repo_url = ?, live_url = ?,
                    cover_image = ?, tech_stack = ?, started_at = ?, completed_at = ?,
                    published_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&project.slug)
            .bind(&project.title)
            .bind(&project.summary)
            .bind(&project.description)
            .bind(&project.description_html)
            .bind(project.status.as_str())
            .bind(project.featured)
            .bind(project.sort_order)
            .bind(&project.repo_url)
            .bind(&project.live_url)
            .bind(&project.cover_image)
            .bind(&tech_stack)
            .bind(project.started_at)
            .bind(project.completed_at)
            .bind(project.published_at)
            .bind(now)
            .bind(project.id)
            .execute(conn)
            .await
            .context("Failed to update project")?;
        });

        Ok(Project {
            updated_at: now,
            ..project.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM projects WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete project")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn reorder(&self, ids: &[i64]) -> Result<()> {
        on_pool!(self.pool, |conn| {
            let mut tx = conn.begin().await.context("Failed to begin transaction")?;
            for (position, id) in ids.iter().enumerate() {
                sqlx::query("UPDATE projects SET sort_order = ? WHERE id = ?")
                    .bind(position as i64)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to reorder projects")?;
            }
            tx.commit().await.context("Failed to commit project order")?;
        });
        Ok(())
    }

    async fn count(&self, status: Option<ContentStatus>) -> Result<i64> {
        let status = status.map(|s| s.as_str());
        on_pool!(self.pool, |conn| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects WHERE (? IS NULL OR status = ?)")
                .bind(status)
                .bind(status)
                .fetch_one(conn)
                .await
                .context("Failed to count projects")
        })
    }

    async fn add_image(&self, image: &ProjectImage) -> Result<ProjectImage> {
        let now = Utc::now();
        let id = on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO project_images (project_id, url, alt_text, caption, sort_order, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(image.project_id)
            .bind(&image.url)
            .bind(&image.alt_text)
            .bind(&image.caption)
            .bind(image.sort_order)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to add project image")?
            .insert_id()
        });
        Ok(ProjectImage {
            id,
            created_at: now,
            ..image.clone()
        })
    }

    async fn list_images(&self, project_id: i64) -> Result<Vec<ProjectImage>> {
        let sql = format!(
            "SELECT {} FROM project_images WHERE project_id = ? ORDER BY sort_order, id",
            IMAGE_COLUMNS
        );
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, ProjectImage>(&sql)
                .bind(project_id)
                .fetch_all(conn)
                .await
                .context("Failed to list project images")
        })
    }

    async fn delete_image(&self, project_id: i64, image_id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM project_images WHERE id = ? AND project_id = ?")
                .bind(image_id)
                .bind(project_id)
                .execute(conn)
                .await
                .context("Failed to delete project image")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn reorder_images(&self, project_id: i64, image_ids: &[i64]) -> Result<()> {
        on_pool!(self.pool, |conn| {
            let mut tx = conn.begin().await.context("Failed to begin transaction")?;
            for (position, id) in image_ids.iter().enumerate() {
                sqlx::query("UPDATE project_images SET sort_order = ? WHERE id = ? AND project_id = ?")
                    .bind(position as i64)
                    .bind(id)
                    .bind(project_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to reorder project images")?;
            }
            tx.commit().await.context("Failed to commit image order")?;
        });
        Ok(())
    }
}
