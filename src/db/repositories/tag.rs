//! Tag repository
//!
//! Tags plus the project/post association tables that reference them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{Tag, TagWithCount};

impl_from_row!(Tag, |row| {
    Ok(Tag {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
});

impl_from_row!(TagWithCount, |row| {
    Ok(TagWithCount {
        tag: Tag {
            id: row.try_get("id")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        },
        project_count: row.try_get("project_count")?,
        post_count: row.try_get("post_count")?,
    })
});

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// All tags ordered by name
    async fn list(&self) -> Result<Vec<Tag>>;

    /// Tags with published project and post counts
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    async fn update(&self, tag: &Tag) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Replace the tag set of a project
    async fn set_for_project(&self, project_id: i64, tag_ids: &[i64]) -> Result<()>;

    async fn list_for_project(&self, project_id: i64) -> Result<Vec<Tag>>;

    /// Replace the tag set of a blog post
    async fn set_for_post(&self, post_id: i64, tag_ids: &[i64]) -> Result<()>;

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Tag>>;
}

pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }

    async fn get_by(&self, column: &str, value: &str) -> Result<Option<Tag>> {
        let sql = format!(
            "SELECT id, slug, name, created_at FROM tags WHERE {} = ?",
            column
        );
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Tag>(&sql)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get tag by {}", column))
        })
    }

    /// Shared by the project and post join tables
    async fn replace_links(&self, table: &str, owner_column: &str, owner_id: i64, tag_ids: &[i64]) -> Result<()> {
        let mut ids = tag_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let delete_sql = format!("DELETE FROM {} WHERE {} = ?", table, owner_column);
        let insert_sql = format!("INSERT INTO {} ({}, tag_id) VALUES (?, ?)", table, owner_column);

        on_pool!(self.pool, |conn| {
            let mut tx = conn.begin().await.context("Failed to begin transaction")?;
            sqlx::query(&delete_sql)
                .bind(owner_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear tag links")?;
            for tag_id in &ids {
                sqlx::query(&insert_sql)
                    .bind(owner_id)
                    .bind(tag_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to link tag")?;
            }
            tx.commit().await.context("Failed to commit tag links")?;
        });
        Ok(())
    }

    async fn linked_tags(&self, table: &str, owner_column: &str, owner_id: i64) -> Result<Vec<Tag>> {
        let sql = format!(
            r#"
            SELECT t.id, t.slug, t.name, t.created_at
            FROM tags t
            INNER JOIN {table} l ON l.tag_id = t.id
            WHERE l.{owner_column} = ?
            ORDER BY t.name
            "#
        );
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Tag>(&sql)
                .bind(owner_id)
                .fetch_all(conn)
                .await
                .context("Failed to load linked tags")
        })
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        let now = Utc::now();
        let id = on_pool!(self.pool, |conn| {
            sqlx::query("INSERT INTO tags (slug, name, created_at) VALUES (?, ?, ?)")
                .bind(&tag.slug)
                .bind(&tag.name)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create tag")?
                .insert_id()
        });
        Ok(Tag {
            id,
            created_at: now,
            ..tag.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Tag>("SELECT id, slug, name, created_at FROM tags WHERE id = ?")
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get tag by id")
        })
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        self.get_by("slug", slug).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        self.get_by("name", name).await
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Tag>("SELECT id, slug, name, created_at FROM tags ORDER BY name")
                .fetch_all(conn)
                .await
                .context("Failed to list tags")
        })
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, TagWithCount>(
                r#"
                SELECT t.id, t.slug, t.name, t.created_at,
                    (SELECT COUNT(*) FROM project_tags pt
                        INNER JOIN projects p ON p.id = pt.project_id
                        WHERE pt.tag_id = t.id AND p.status = 'published') AS project_count,
                    (SELECT COUNT(*) FROM post_tags bt
                        INNER JOIN blog_posts b ON b.id = bt.post_id
                        WHERE bt.tag_id = t.id AND b.status = 'published') AS post_count
                FROM tags t
                ORDER BY t.name
                "#,
            )
            .fetch_all(conn)
            .await
            .context("Failed to list tag counts")
        })
    }

    async fn update(&self, tag: &Tag) -> Result<()> {
        on_pool!(self.pool, |conn| {
            sqlx::query("UPDATE tags SET slug = ?, name = ? WHERE id = ?")
                .bind(&tag.slug)
                .bind(&tag.name)
                .bind(tag.id)
                .execute(conn)
                .await
                .context("Failed to update tag")?;
        });
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM tags WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete tag")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn set_for_project(&self, project_id: i64, tag_ids: &[i64]) -> Result<()> {
        self.replace_links("project_tags", "project_id", project_id, tag_ids)
            .await
    }

    async fn list_for_project(&self, project_id: i64) -> Result<Vec<Tag>> {
        self.linked_tags("project_tags", "project_id", project_id).await
    }

    async fn set_for_post(&self, post_id: i64, tag_ids: &[i64]) -> Result<()> {
        self.replace_links("post_tags", "post_id", post_id, tag_ids).await
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Tag>> {
        self.linked_tags("post_tags", "post_id", post_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    async fn insert_project(pool: &DynDatabasePool, slug: &str, status: &str) -> i64 {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO projects (slug, title, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(slug)
        .bind(slug)
        .bind(status)
        .bind(now)
        .bind(now)
        .execute(pool.sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = SqlxTagRepository::new(migrated_pool().await);
        let tag = repo.create(&Tag::new("rust".into(), "Rust".into())).await.unwrap();

        assert_eq!(repo.get_by_id(tag.id).await.unwrap().unwrap().name, "Rust");
        assert_eq!(repo.get_by_slug("rust").await.unwrap().unwrap().id, tag.id);
        assert_eq!(repo.get_by_name("Rust").await.unwrap().unwrap().id, tag.id);
        assert!(repo.create(&Tag::new("rust".into(), "Other".into())).await.is_err());
    }

    #[tokio::test]
    async fn test_project_links_replace_and_count() {
        let pool = migrated_pool().await;
        let repo = SqlxTagRepository::new(pool.clone());
        let rust = repo.create(&Tag::new("rust".into(), "Rust".into())).await.unwrap();
        let web = repo.create(&Tag::new("web".into(), "Web".into())).await.unwrap();

        let published = insert_project(&pool, "a", "published").await;
        let draft = insert_project(&pool, "b", "draft").await;

        repo.set_for_project(published, &[rust.id, web.id, rust.id]).await.unwrap();
        repo.set_for_project(draft, &[rust.id]).await.unwrap();
        assert_eq!(repo.list_for_project(published).await.unwrap().len(), 2);

        let counts = repo.list_with_counts().await.unwrap();
        let rust_count = counts.iter().find(|t| t.tag.slug == "rust").unwrap();
        assert_eq!(rust_count.project_count, 1);
        assert_eq!(rust_count.post_count, 0);

        repo.set_for_project(published, &[web.id]).await.unwrap();
        let ids: Vec<i64> = repo
            .list_for_project(published)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![web.id]);
    }

    #[tokio::test]
    async fn test_delete_removes_links() {
        let pool = migrated_pool().await;
        let repo = SqlxTagRepository::new(pool.clone());
        let rust = repo.create(&Tag::new("rust".into(), "Rust".into())).await.unwrap();
        let project = insert_project(&pool, "a", "published").await;
        repo.set_for_project(project, &[rust.id]).await.unwrap();

        assert!(repo.delete(rust.id).await.unwrap());
        assert!(repo.list_for_project(project).await.unwrap().is_empty());
    }
}
