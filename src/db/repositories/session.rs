//! Session repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::Session;

impl_from_row!(Session, |row| {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
});

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete every expired session, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        on_pool!(self.pool, |conn| {
            sqlx::query(
                "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(session.created_at)
            .execute(conn)
            .await
            .context("Failed to create session")?;
        });
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Session>(
                "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to get session")
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete session")?;
        });
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to delete user sessions")?;
        });
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let removed = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected()
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, migrated_pool};
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::models::UserRole;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_get_delete() {
        let pool = migrated_pool().await;
        let user = insert_user(&pool, "jane", UserRole::Admin).await;
        let repo = SqlxSessionRepository::new(pool);

        let session = Session::new("tok".into(), user.id, Duration::days(7));
        repo.create(&session).await.unwrap();

        let stored = repo.get_by_id("tok").await.unwrap().unwrap();
        assert_eq!(stored.user_id, user.id);
        assert!(!stored.is_expired());

        repo.delete("tok").await.unwrap();
        assert!(repo.get_by_id("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_sessions() {
        let pool = migrated_pool().await;
        let user = insert_user(&pool, "jane", UserRole::Admin).await;
        let repo = SqlxSessionRepository::new(pool);

        repo.create(&Session::new("old".into(), user.id, Duration::hours(-1)))
            .await
            .unwrap();
        repo.create(&Session::new("new".into(), user.id, Duration::days(1)))
            .await
            .unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sessions_cascade_with_user() {
        let pool = migrated_pool().await;
        let user = insert_user(&pool, "jane", UserRole::Admin).await;
        let repo = SqlxSessionRepository::new(pool.clone());
        repo.create(&Session::new("tok".into(), user.id, Duration::days(1)))
            .await
            .unwrap();

        SqlxUserRepository::new(pool)
            .delete(user.id)
            .await
            .unwrap();
        assert!(repo.get_by_id("tok").await.unwrap().is_none());
    }
}
