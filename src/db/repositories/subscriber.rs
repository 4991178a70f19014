//! Newsletter subscriber repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use super::decode_enum;
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{ListParams, Subscriber, SubscriberStatus};

impl_from_row!(Subscriber, |row| {
    Ok(Subscriber {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        status: decode_enum::<SubscriberStatus>("status", row.try_get("status")?)?,
        token: row.try_get("token")?,
        created_at: row.try_get("created_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
        unsubscribed_at: row.try_get("unsubscribed_at")?,
    })
});

const SUBSCRIBER_COLUMNS: &str =
    "id, email, name, status, token, created_at, confirmed_at, unsubscribed_at";

#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    async fn create(&self, subscriber: &Subscriber) -> Result<Subscriber>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Subscriber>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<Subscriber>>;

    async fn get_by_token(&self, token: &str) -> Result<Option<Subscriber>>;

    /// Persist status, token, name and the lifecycle timestamps
    async fn update(&self, subscriber: &Subscriber) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn list(
        &self,
        status: Option<SubscriberStatus>,
        params: &ListParams,
    ) -> Result<(Vec<Subscriber>, i64)>;

    /// Every subscriber, oldest first (CSV export)
    async fn list_all(&self) -> Result<Vec<Subscriber>>;

    async fn count(&self, status: Option<SubscriberStatus>) -> Result<i64>;
}

pub struct SqlxSubscriberRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriberRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriberRepository> {
        Arc::new(Self::new(pool))
    }

    async fn get_by(&self, column: &str, value: &str) -> Result<Option<Subscriber>> {
        let sql = format!(
            "SELECT {} FROM subscribers WHERE {} = ?",
            SUBSCRIBER_COLUMNS, column
        );
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Subscriber>(&sql)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get subscriber by {}", column))
        })
    }
}

#[async_trait]
impl SubscriberRepository for SqlxSubscriberRepository {
    async fn create(&self, subscriber: &Subscriber) -> Result<Subscriber> {
        let id = on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO subscribers (email, name, status, token, created_at, confirmed_at, unsubscribed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&subscriber.email)
            .bind(&subscriber.name)
            .bind(subscriber.status.as_str())
            .bind(&subscriber.token)
            .bind(subscriber.created_at)
            .bind(subscriber.confirmed_at)
            .bind(subscriber.unsubscribed_at)
            .execute(conn)
            .await
            .context("Failed to create subscriber")?
            .insert_id()
        });
        Ok(Subscriber {
            id,
            ..subscriber.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Subscriber>> {
        let sql = format!("SELECT {} FROM subscribers WHERE id = ?", SUBSCRIBER_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Subscriber>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get subscriber by id")
        })
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Subscriber>> {
        self.get_by("email", email).await
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Subscriber>> {
        self.get_by("token", token).await
    }

    async fn update(&self, subscriber: &Subscriber) -> Result<()> {
        on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE subscribers
                SET name = ?, status = ?, token = ?, confirmed_at = ?, unsubscribed_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&subscriber.name)
            .bind(subscriber.status.as_str())
            .bind(&subscriber.token)
            .bind(subscriber.confirmed_at)
            .bind(subscriber.unsubscribed_at)
            .bind(subscriber.id)
            .execute(conn)
            .await
            .context("Failed to update subscriber")?;
        });
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM subscribers WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete subscriber")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn list(
        &self,
        status: Option<SubscriberStatus>,
        params: &ListParams,
    ) -> Result<(Vec<Subscriber>, i64)> {
        let status = status.map(|s| s.as_str());
        let sql = format!(
            "SELECT {} FROM subscribers WHERE (? IS NULL OR status = ?) \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            SUBSCRIBER_COLUMNS
        );
        on_pool!(self.pool, |conn| {
            let items = sqlx::query_as::<_, Subscriber>(&sql)
                .bind(status)
                .bind(status)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list subscribers")?;
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM subscribers WHERE (? IS NULL OR status = ?)",
            )
            .bind(status)
            .bind(status)
            .fetch_one(conn)
            .await
            .context("Failed to count subscribers")?;
            Ok((items, total))
        })
    }

    async fn list_all(&self) -> Result<Vec<Subscriber>> {
        let sql = format!("SELECT {} FROM subscribers ORDER BY id", SUBSCRIBER_COLUMNS);
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Subscriber>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list subscribers")
        })
    }

    async fn count(&self, status: Option<SubscriberStatus>) -> Result<i64> {
        let status = status.map(|s| s.as_str());
        on_pool!(self.pool, |conn| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM subscribers WHERE (? IS NULL OR status = ?)",
            )
            .bind(status)
            .bind(status)
            .fetch_one(conn)
            .await
            .context("Failed to count subscribers")
        })
    }
}
