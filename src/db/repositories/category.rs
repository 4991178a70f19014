//! Blog category repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{Category, CategoryWithCount};

impl_from_row!(Category, |row| {
    Ok(Category {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
});

impl_from_row!(CategoryWithCount, |row| {
    Ok(CategoryWithCount {
        category: Category {
            id: row.try_get("id")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        },
        post_count: row.try_get("post_count")?,
    })
});

const CATEGORY_COLUMNS: &str = "id, slug, name, description, created_at";

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    async fn list(&self) -> Result<Vec<Category>>;

    /// Categories with their published post counts, ordered by name
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>>;

    async fn update(&self, category: &Category) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Replace the categories of a blog post
    async fn set_for_post(&self, post_id: i64, category_ids: &[i64]) -> Result<()>;

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Category>>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        let id = on_pool!(self.pool, |conn| {
            sqlx::query(
                "INSERT INTO categories (slug, name, description, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&category.slug)
            .bind(&category.name)
            .bind(&category.description)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create category")?
            .insert_id()
        });
        Ok(Category {
            id,
            created_at: now,
            ..category.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Category>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get category by id")
        })
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Category>(&sql)
                .bind(slug)
                .fetch_optional(conn)
                .await
                .context("Failed to get category by slug")
        })
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("SELECT {} FROM categories ORDER BY name", CATEGORY_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Category>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list categories")
        })
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, CategoryWithCount>(
                r#"
                SELECT c.id, c.slug, c.name, c.description, c.created_at,
                    (SELECT COUNT(*) FROM post_categories pc
                        INNER JOIN blog_posts b ON b.id = pc.post_id
                        WHERE pc.category_id = c.id AND b.status = 'published') AS post_count
                FROM categories c
                ORDER BY c.name
                "#,
            )
            .fetch_all(conn)
            .await
            .context("Failed to list category counts")
        })
    }

    async fn update(&self, category: &Category) -> Result<()> {
        on_pool!(self.pool, |conn| {
            sqlx::query("UPDATE categories SET slug = ?, name = ?, description = ? WHERE id = ?")
                .bind(&category.slug)
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.id)
                .execute(conn)
                .await
                .context("Failed to update category")?;
        });
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM categories WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete category")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn set_for_post(&self, post_id: i64, category_ids: &[i64]) -> Result<()> {
        let mut ids = category_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        on_pool!(self.pool, |conn| {
            let mut tx = conn.begin().await.context("Failed to begin transaction")?;
            sqlx::query("DELETE FROM post_categories WHERE post_id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear post categories")?;
            for category_id in &ids {
                sqlx::query("INSERT INTO post_categories (post_id, category_id) VALUES (?, ?)")
                    .bind(post_id)
                    .bind(category_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to link category")?;
            }
            tx.commit().await.context("Failed to commit post categories")?;
        });
        Ok(())
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Category>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Category>(
                r#"
                SELECT c.id, c.slug, c.name, c.description, c.created_at
                FROM categories c
                INNER JOIN post_categories pc ON pc.category_id = c.id
                WHERE pc.post_id = ?
                ORDER BY c.name
                "#,
            )
            .bind(post_id)
            .fetch_all(conn)
            .await
            .context("Failed to load post categories")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    fn sample(slug: &str) -> Category {
        Category {
            id: 0,
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_crud() {
        let repo = SqlxCategoryRepository::new(migrated_pool().await);
        let mut category = repo.create(&sample("notes")).await.unwrap();
        assert!(repo.create(&sample("notes")).await.is_err());

        category.description = Some("Short notes".to_string());
        repo.update(&category).await.unwrap();
        let stored = repo.get_by_slug("notes").await.unwrap().unwrap();
        assert_eq!(stored.description.as_deref(), Some("Short notes"));

        let counts = repo.list_with_counts().await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].post_count, 0);

        assert!(repo.delete(category.id).await.unwrap());
        assert!(repo.get_by_id(category.id).await.unwrap().is_none());
    }
}
