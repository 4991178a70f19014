//! Settings repository
//!
//! Key/value storage for site profile settings.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;

/// A stored key/value pair
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl_from_row!(Setting, |row| {
    Ok(Setting {
        key: row.try_get("setting_key")?,
        value: row.try_get("value")?,
        updated_at: row.try_get("updated_at")?,
    })
});

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    async fn get_all(&self) -> Result<Vec<Setting>>;

    /// Values for the given keys; missing keys are absent from the map
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, String>>;

    /// Insert or replace a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn set_many(&self, pairs: &[(&str, String)]) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

pub struct SqlxSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Setting>(
                "SELECT setting_key, value, updated_at FROM settings WHERE setting_key = ?",
            )
            .bind(key)
            .fetch_optional(conn)
            .await
            .context("Failed to get setting")
        })
    }

    async fn get_all(&self) -> Result<Vec<Setting>> {
        on_pool!(self.pool, |conn| {
            sqlx::query_as::<_, Setting>(
                "SELECT setting_key, value, updated_at FROM settings ORDER BY setting_key",
            )
            .fetch_all(conn)
            .await
            .context("Failed to list settings")
        })
    }

    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let wanted: std::collections::HashSet<&str> = keys.iter().copied().collect();
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|setting| wanted.contains(setting.key.as_str()))
            .map(|setting| (setting.key, setting.value))
            .collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => set_sqlite(self.pool.sqlite()?, key, value).await,
            DatabaseDriver::Mysql => set_mysql(self.pool.mysql()?, key, value).await,
        }
    }

    async fn set_many(&self, pairs: &[(&str, String)]) -> Result<()> {
        for (key, value) in pairs {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM settings WHERE setting_key = ?")
                .bind(key)
                .execute(conn)
                .await
                .context("Failed to delete setting")?;
        });
        Ok(())
    }
}

async fn set_sqlite(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (setting_key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(setting_key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to save setting")?;
    Ok(())
}

async fn set_mysql(pool: &MySqlPool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (setting_key, value, updated_at) VALUES (?, ?, ?)
         ON DUPLICATE KEY UPDATE value = VALUES(value), updated_at = VALUES(updated_at)",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to save setting")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    #[tokio::test]
    async fn test_set_overwrites() {
        let repo = SqlxSettingsRepository::new(migrated_pool().await);
        repo.set("headline", "Engineer").await.unwrap();
        repo.set("headline", "Rustacean").await.unwrap();

        let setting = repo.get("headline").await.unwrap().unwrap();
        assert_eq!(setting.value, "Rustacean");
        assert_eq!(repo.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_many_and_delete() {
        let repo = SqlxSettingsRepository::new(migrated_pool().await);
        repo.set_many(&[("bio", "hi".to_string()), ("location", "Oslo".to_string())])
            .await
            .unwrap();

        let map = repo.get_many(&["bio", "missing"]).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["bio"], "hi");

        repo.delete("bio").await.unwrap();
        assert!(repo.get("bio").await.unwrap().is_none());
    }
}
