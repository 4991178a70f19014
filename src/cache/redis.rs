//! Redis cache
//!
//! Every key is stored under a namespace prefix so `clear` and pattern
//! deletion never touch keys owned by other applications sharing the server.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "folio";

const SCAN_COUNT: usize = 100;

pub struct RedisCache {
    connection: MultiplexedConnection,
    namespace: String,
    default_ttl: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("namespace", &self.namespace)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn with_ttl(redis_url: &str, default_ttl: Duration) -> Result<Self> {
        Self::with_namespace(redis_url, DEFAULT_NAMESPACE, default_ttl).await
    }

    pub async fn with_namespace(
        redis_url: &str,
        namespace: &str,
        default_ttl: Duration,
    ) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            namespace: namespace.to_string(),
            default_ttl,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Delete every key matching an already namespaced glob
    async fn scan_and_delete(&self, pattern: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .context("Failed to scan keys in Redis")?;

            if !keys.is_empty() {
                let _: () = conn
                    .del(&keys)
                    .await
                    .context("Failed to delete keys from Redis")?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn
            .get(self.namespaced(key))
            .await
            .context("Failed to get value from Redis")?;

        raw.map(|json| serde_json::from_str(&json).context("Failed to deserialize cached value"))
            .transpose()
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;

        // SETEX granularity is one second
        let _: () = conn
            .set_ex(self.namespaced(key), json, ttl.as_secs().max(1))
            .await
            .context("Failed to set value in Redis")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(self.namespaced(key))
            .await
            .context("Failed to delete key from Redis")?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        self.scan_and_delete(&self.namespaced(pattern)).await
    }

    async fn clear(&self) -> Result<()> {
        self.scan_and_delete(&self.namespaced("*")).await
    }
}
