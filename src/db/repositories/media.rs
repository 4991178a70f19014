//! Media library repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{ListParams, Media};

impl_from_row!(Media, |row| {
    Ok(Media {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        original_name: row.try_get("original_name")?,
        content_type: row.try_get("content_type")?,
        size: row.try_get("size")?,
        url: row.try_get("url")?,
        uploaded_by: row.try_get("uploaded_by")?,
        created_at: row.try_get("created_at")?,
    })
});

const MEDIA_COLUMNS: &str =
    "id, filename, original_name, content_type, size, url, uploaded_by, created_at";

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create(&self, media: &Media) -> Result<Media>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>>;

    /// Newest first
    async fn list(&self, params: &ListParams) -> Result<(Vec<Media>, i64)>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxMediaRepository {
    pool: DynDatabasePool,
}

impl SqlxMediaRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MediaRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MediaRepository for SqlxMediaRepository {
    async fn create(&self, media: &Media) -> Result<Media> {
        let now = Utc::now();
        let id = on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO media (filename, original_name, content_type, size, url, uploaded_by, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&media.filename)
            .bind(&media.original_name)
            .bind(&media.content_type)
            .bind(media.size)
            .bind(&media.url)
            .bind(media.uploaded_by)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create media record")?
            .insert_id()
        });
        Ok(Media {
            id,
            created_at: now,
            ..media.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Media>> {
        let sql = format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Media>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get media")
        })
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Media>, i64)> {
        let sql = format!(
            "SELECT {} FROM media ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            MEDIA_COLUMNS
        );
        on_pool!(self.pool, |conn| {
            let items = sqlx::query_as::<_, Media>(&sql)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list media")?;
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM media")
                .fetch_one(conn)
                .await
                .context("Failed to count media")?;
            Ok((items, total))
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM media WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete media")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, migrated_pool};
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::models::UserRole;

    #[tokio::test]
    async fn test_uploader_deletion_keeps_media() {
        let pool = migrated_pool().await;
        let user = insert_user(&pool, "jane", UserRole::Editor).await;
        let repo = SqlxMediaRepository::new(pool.clone());

        let media = repo
            .create(&Media {
                id: 0,
                filename: "abc.png".into(),
                original_name: "cat.png".into(),
                content_type: "image/png".into(),
                size: 42,
                url: "/uploads/abc.png".into(),
                uploaded_by: Some(user.id),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        SqlxUserRepository::new(pool).delete(user.id).await.unwrap();

        let stored = repo.get_by_id(media.id).await.unwrap().unwrap();
        assert_eq!(stored.uploaded_by, None);
        let (items, total) = repo.list(&ListParams::default()).await.unwrap();
        assert_eq!((items.len(), total), (1, 1));

        assert!(repo.delete(media.id).await.unwrap());
    }
}
