//! Cache Provider
//!
//! The [`CacheStore`] contract, the two-variant [`Cache`] enum that
//! implements it, and the backend factory.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::memory::MemoryCache;
use crate::cache::redis::{RedisCache, RedisPoolStats};
use crate::cache::stats::CacheStats;
use crate::config::{CacheBackend, CacheConfig};
use crate::error::CacheResult;

// == Cache Store Trait ==
/// Contract shared by both backends.
///
/// `get` and `ttl` fail with `NotFound` or `Expired` for absent keys; an
/// expired entry is removed as a side effect of discovering it.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Vec<u8>>;

    /// Stores `value`, replacing any previous entry. May fail with `LimitExceeded`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn exists(&self, key: &str) -> bool;

    /// Remaining lifetime. `Duration::MAX` means the key never expires,
    /// which only happens for keys written outside this crate.
    async fn ttl(&self, key: &str) -> CacheResult<Duration>;

    async fn clear(&self) -> CacheResult<()>;

    /// Releases background resources (sweep or health-check task).
    async fn close(&self);
}

// == Stats Report ==
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CacheStatsReport {
    Memory(CacheStats),
    Redis(RedisPoolStats),
}

// == Cache ==
/// The selected backend.
#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    Redis(RedisCache),
}

impl Cache {
    // == Factory ==
    /// Builds the configured backend.
    ///
    /// An explicit in-process request always succeeds. A networked request
    /// that fails its connection probe is logged and replaced by the
    /// in-process backend for the lifetime of the process.
    pub async fn from_config(config: &CacheConfig) -> Self {
        match config.backend {
            CacheBackend::Memory => Self::memory(config),
            CacheBackend::Redis => match RedisCache::connect(&config.redis).await {
                Ok(redis) => Cache::Redis(redis),
                Err(e) => {
                    warn!(
                        address = %config.redis.address(),
                        error = %e,
                        "Redis cache unavailable, falling back to in-process cache"
                    );
                    Self::memory(config)
                }
            },
        }
    }

    fn memory(config: &CacheConfig) -> Self {
        info!(
            max_memory_mb = config.max_memory_mb,
            max_items = config.max_items,
            "Using in-process cache"
        );
        Cache::Memory(MemoryCache::new(config.max_memory_bytes(), config.max_items))
    }

    pub fn backend(&self) -> CacheBackend {
        match self {
            Cache::Memory(_) => CacheBackend::Memory,
            Cache::Redis(_) => CacheBackend::Redis,
        }
    }

    // == JSON Helpers ==
    /// Reads and decodes a JSON value.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<T> {
        let bytes = self.get(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Encodes `value` as JSON and stores it.
    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes, ttl).await
    }

    pub async fn stats(&self) -> CacheStatsReport {
        match self {
            Cache::Memory(memory) => CacheStatsReport::Memory(memory.stats().await),
            Cache::Redis(redis) => CacheStatsReport::Redis(redis.stats()),
        }
    }
}

#[async_trait]
impl CacheStore for Cache {
    async fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        match self {
            Cache::Memory(memory) => memory.get(key).await,
            Cache::Redis(redis) => redis.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        match self {
            Cache::Memory(memory) => memory.set(key, value, ttl).await,
            Cache::Redis(redis) => redis.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        match self {
            Cache::Memory(memory) => memory.delete(key).await,
            Cache::Redis(redis) => redis.delete(key).await,
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self {
            Cache::Memory(memory) => memory.exists(key).await,
            Cache::Redis(redis) => redis.exists(key).await,
        }
    }

    async fn ttl(&self, key: &str) -> CacheResult<Duration> {
        match self {
            Cache::Memory(memory) => memory.ttl(key).await,
            Cache::Redis(redis) => redis.ttl(key).await,
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        match self {
            Cache::Memory(memory) => {
                memory.clear().await;
                Ok(())
            }
            Cache::Redis(redis) => redis.clear().await,
        }
    }

    async fn close(&self) {
        match self {
            Cache::Memory(memory) => memory.close().await,
            Cache::Redis(redis) => redis.close().await,
        }
    }
}

impl From<MemoryCache> for Cache {
    fn from(memory: MemoryCache) -> Self {
        Cache::Memory(memory)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use crate::error::CacheError;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_memory_request_always_succeeds() {
        let cache = Cache::from_config(&CacheConfig::memory(1, 10)).await;
        assert_eq!(cache.backend(), CacheBackend::Memory);
        cache.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis: RedisConfig {
                host: "127.0.0.1".to_string(),
                port: 1,
                dial_timeout: Duration::from_millis(300),
                pool_timeout: Duration::from_millis(200),
                ..RedisConfig::default()
            },
            ..CacheConfig::default()
        };

        let cache = Cache::from_config(&config).await;

        assert_eq!(cache.backend(), CacheBackend::Memory);
        cache.set("k", b"v".to_vec(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), b"v");
        cache.close().await;
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = Cache::from(MemoryCache::new(0, 0));
        let value = Payload {
            name: "answers".to_string(),
            count: 3,
        };

        cache
            .set_json("k", &value, Duration::from_secs(5))
            .await
            .unwrap();
        let decoded: Payload = cache.get_json("k").await.unwrap();

        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn test_get_json_reports_corrupt_bytes() {
        let cache = Cache::from(MemoryCache::new(0, 0));
        cache
            .set("k", b"not json".to_vec(), Duration::from_secs(5))
            .await
            .unwrap();

        let result: CacheResult<Payload> = cache.get_json("k").await;

        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_clear_and_stats_report() {
        let cache = Cache::from(MemoryCache::new(0, 0));
        cache.set("a", b"1".to_vec(), Duration::from_secs(5)).await.unwrap();
        cache.set("b", b"2".to_vec(), Duration::from_secs(5)).await.unwrap();

        match cache.stats().await {
            CacheStatsReport::Memory(stats) => assert_eq!(stats.items, 2),
            other => panic!("unexpected report {:?}", other),
        }

        cache.clear().await.unwrap();
        assert!(!cache.exists("a").await);
    }
}
