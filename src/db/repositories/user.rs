//! User repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::decode_enum;
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{User, UserRole};

impl_from_row!(User, |row| {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: decode_enum::<UserRole>("role", row.try_get("role")?)?,
        display_name: row.try_get("display_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
});

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, display_name, created_at, updated_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update profile fields, role and password hash
    async fn update(&self, user: &User) -> Result<User>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;

    /// All users, oldest first
    async fn list(&self) -> Result<Vec<User>>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, User>(&sql)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get user by {}", column))
        })
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let id = on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO users (username, email, password_hash, role, display_name, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(&user.display_name)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create user")?
            .insert_id()
        });

        Ok(User {
            id,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get user by id")
        })
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_one_by("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_by("email", email).await
    }

    async fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE users
                SET username = ?, email = ?, password_hash = ?, role = ?, display_name = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(&user.display_name)
            .bind(now)
            .bind(user.id)
            .execute(conn)
            .await
            .context("Failed to update user")?;
        });

        Ok(User {
            updated_at: now,
            ..user.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete user")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        on_pool!(self.pool, |conn| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(conn)
                .await
                .context("Failed to count users")
        })
    }

    async fn list(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, User>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list users")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    async fn setup_repo() -> SqlxUserRepository {
        SqlxUserRepository::new(migrated_pool().await)
    }

    fn sample(username: &str) -> User {
        User::new(
            username.to_string(),
            format!("{}@example.com", username),
            "$argon2id$v=19$fake".to_string(),
            UserRole::Editor,
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_repo().await;
        let created = repo.create(&sample("jane")).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "jane");
        assert_eq!(by_id.role, UserRole::Editor);
        assert_eq!(by_id.password_hash, "$argon2id$v=19$fake");

        assert!(repo.get_by_username("jane").await.unwrap().is_some());
        assert!(repo.get_by_email("jane@example.com").await.unwrap().is_some());
        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_username_and_email() {
        let repo = setup_repo().await;
        repo.create(&sample("jane")).await.unwrap();
        assert!(repo.create(&sample("jane")).await.is_err());

        let mut other = sample("john");
        other.email = "jane@example.com".to_string();
        assert!(repo.create(&other).await.is_err());
    }

    #[tokio::test]
    async fn test_update_role_and_display_name() {
        let repo = setup_repo().await;
        let mut user = repo.create(&sample("jane")).await.unwrap();
        user.role = UserRole::Admin;
        user.display_name = Some("Jane Doe".to_string());
        repo.update(&user).await.unwrap();

        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.role, UserRole::Admin);
        assert_eq!(stored.display_name.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let repo = setup_repo().await;
        let a = repo.create(&sample("a")).await.unwrap();
        repo.create(&sample("b")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        assert!(repo.delete(a.id).await.unwrap());
        assert!(!repo.delete(a.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
