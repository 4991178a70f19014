//! Cache layer
//!
//! An in-memory moka cache by default, or Redis when the `redis-cache`
//! feature is enabled and configured. Services cache public reads under
//! namespaced keys (`project:slug:<slug>`, `post:list:...`) and drop them by
//! glob pattern on writes.

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

/// Cache backend operations
///
/// The methods are generic, so the trait is not object safe; `Cache` is the
/// runtime-polymorphic handle.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a glob (`*`, `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    #[cfg(feature = "redis-cache")]
    Redis(RedisCache),
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete(key).await,
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete_pattern(pattern).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.clear().await,
        }
    }
}

impl Cache {
    /// Fresh in-memory cache, used by tests and as a fallback
    pub fn memory() -> Arc<Self> {
        Arc::new(Cache::Memory(MemoryCache::new()))
    }

    /// Return the cached value for `key`, or run `load` and cache its result.
    ///
    /// Cache failures are logged and treated as misses; only `load` errors
    /// reach the caller.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, ttl: Duration, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get::<T>(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "Cache read failed"),
        }

        let value = load().await?;
        if let Err(e) = self.set(key, &value, ttl).await {
            tracing::warn!(key, error = %e, "Cache write failed");
        }
        Ok(value)
    }

    /// Drop keys matching `pattern`, logging instead of failing
    pub async fn invalidate(&self, pattern: &str) {
        if let Err(e) = self.delete_pattern(pattern).await {
            tracing::warn!(pattern, error = %e, "Cache invalidation failed");
        }
    }
}

pub async fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    let ttl = Duration::from_secs(config.ttl_seconds);

    match config.driver {
        CacheDriver::Memory => Ok(Arc::new(Cache::Memory(MemoryCache::with_capacity_and_ttl(
            10_000, ttl,
        )))),
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Redis URL is required for the redis cache driver \
                         (cache.redis_url or FOLIO_CACHE_REDIS_URL)"
                    )
                })?;
                let cache = RedisCache::with_ttl(redis_url, ttl).await?;
                Ok(Arc::new(Cache::Redis(cache)))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "The redis cache driver requires building with `--features redis-cache`"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_create_memory_cache() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();
        cache
            .set("key", &"value".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let value: Option<String> = cache.get("key").await.unwrap();
        assert_eq!(value.as_deref(), Some("value"));
    }

    #[cfg(not(feature = "redis-cache"))]
    #[tokio::test]
    async fn test_redis_driver_without_feature() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: Some("redis://localhost:6379".to_string()),
            ttl_seconds: 60,
        };
        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("redis-cache"));
    }

    #[tokio::test]
    async fn test_get_or_load_runs_loader_once() {
        let cache = Cache::memory();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<i64, anyhow::Error> = cache
                .get_or_load("answer", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(value.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate("ans*").await;
        let _: Result<i64, anyhow::Error> = cache
            .get_or_load("answer", Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loader_errors_are_not_cached() {
        let cache = Cache::memory();
        let failed: Result<i64, String> = cache
            .get_or_load("k", Duration::from_secs(60), || async { Err("boom".to_string()) })
            .await;
        assert!(failed.is_err());
        assert!(cache.get::<i64>("k").await.unwrap().is_none());
    }
}
