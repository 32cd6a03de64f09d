//! Networked Cache Backend
//!
//! Pooled client for a Redis-compatible server. Construction probes the
//! server once; after that, failures surface per call and a background
//! health check only logs.

use std::time::Duration;

use bb8_redis::bb8::{self, Pool, RunError};
use bb8_redis::redis::{self, FromRedisValue, RedisError};
use bb8_redis::RedisConnectionManager;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RedisConfig;
use crate::error::{CacheError, CacheResult};

/// Interval of the observability-only health check.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

// == Pool Stats ==
#[derive(Debug, Clone, Serialize)]
pub struct RedisPoolStats {
    pub address: String,
    pub connections: u32,
    pub idle_connections: u32,
    pub max_size: u32,
}

/// A single failed try, classified for the retry loop.
enum Failure {
    Retryable(String),
    Fatal(String),
}

impl Failure {
    fn from_redis(err: RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            Failure::Retryable(err.to_string())
        } else {
            Failure::Fatal(err.to_string())
        }
    }

    fn into_message(self) -> String {
        match self {
            Failure::Retryable(msg) | Failure::Fatal(msg) => msg,
        }
    }
}

// == Redis Cache ==
pub struct RedisCache {
    pool: Pool<RedisConnectionManager>,
    address: String,
    pool_size: u32,
    max_retries: u32,
    read_timeout: Duration,
    write_timeout: Duration,
    shutdown: CancellationToken,
    health_check: Mutex<Option<JoinHandle<()>>>,
}

impl RedisCache {
    // == Connect ==
    /// Builds the pool and probes the server with `PING`.
    ///
    /// Any failure, including a dial timeout, is reported as
    /// `CacheError::Connection` so the factory can fall back.
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        let config = config.clone().with_defaults();
        let address = config.address();

        let manager = RedisConnectionManager::new(config.connection_url())
            .map_err(|e| CacheError::Connection(format!("invalid redis url: {}", e)))?;

        let build = bb8::Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.min_idle_conns))
            .connection_timeout(config.pool_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(config.max_conn_age)
            .build(manager);

        let pool = tokio::time::timeout(config.dial_timeout, build)
            .await
            .map_err(|_| CacheError::Connection(format!("dial timeout connecting to {}", address)))?
            .map_err(|e| CacheError::Connection(format!("failed to connect to {}: {}", address, e)))?;

        let shutdown = CancellationToken::new();
        let cache = Self {
            pool,
            address,
            pool_size: config.pool_size,
            max_retries: config.max_retries,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            shutdown,
            health_check: Mutex::new(None),
        };

        cache.ping().await?;
        info!(address = %cache.address, pool_size = config.pool_size, "Connected to redis cache");

        let handle = spawn_health_check(
            cache.pool.clone(),
            cache.address.clone(),
            HEALTH_CHECK_INTERVAL,
            cache.shutdown.clone(),
        );
        *cache.health_check.lock().await = Some(handle);

        Ok(cache)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn ping(&self) -> CacheResult<()> {
        let _: String = self.query(&redis::cmd("PING"), self.read_timeout).await?;
        Ok(())
    }

    // == Query ==
    /// Runs `cmd`, retrying transport failures up to `max_retries` times.
    async fn query<T: FromRedisValue + Send>(&self, cmd: &redis::Cmd, timeout: Duration) -> CacheResult<T> {
        let mut retries = 0;
        loop {
            match self.try_query(cmd, timeout).await {
                Ok(value) => return Ok(value),
                Err(Failure::Retryable(msg)) if retries < self.max_retries => {
                    retries += 1;
                    debug!(address = %self.address, retries, error = %msg, "Retrying redis command");
                    tokio::time::sleep(RETRY_BACKOFF * retries).await;
                }
                Err(failure) => return Err(CacheError::Connection(failure.into_message())),
            }
        }
    }

    async fn try_query<T: FromRedisValue + Send>(
        &self,
        cmd: &redis::Cmd,
        timeout: Duration,
    ) -> Result<T, Failure> {
        let mut conn = self.pool.get().await.map_err(|e| match e {
            RunError::User(err) => Failure::from_redis(err),
            RunError::TimedOut => {
                Failure::Fatal(format!("timed out waiting for a pooled connection to {}", self.address))
            }
        })?;

        let result: redis::RedisResult<T> = match tokio::time::timeout(timeout, cmd.query_async(&mut *conn)).await {
            Ok(result) => result,
            Err(_) => return Err(Failure::Retryable(format!("command timed out after {:?}", timeout))),
        };
        result.map_err(Failure::from_redis)
    }

    // == Get ==
    pub async fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        let value: Option<Vec<u8>> = self.query(redis::cmd("GET").arg(key), self.read_timeout).await?;
        value.ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    // == Set ==
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if ttl_ms == 0 {
            return Err(CacheError::InvalidRequest(
                "TTL must be at least one millisecond".to_string(),
            ));
        }

        let _: () = self
            .query(
                redis::cmd("SET").arg(key).arg(value).arg("PX").arg(ttl_ms),
                self.write_timeout,
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let removed: u64 = self.query(redis::cmd("DEL").arg(key), self.write_timeout).await?;
        if removed == 0 {
            return Err(CacheError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// Errors are reported as absent.
    pub async fn exists(&self, key: &str) -> bool {
        match self.query::<u64>(redis::cmd("EXISTS").arg(key), self.read_timeout).await {
            Ok(count) => count > 0,
            Err(e) => {
                warn!(key, error = %e, "Redis EXISTS failed");
                false
            }
        }
    }

    // == TTL ==
    /// Keys written without an expiry (by another client) report `Duration::MAX`.
    pub async fn ttl(&self, key: &str) -> CacheResult<Duration> {
        let remaining: i64 = self.query(redis::cmd("PTTL").arg(key), self.read_timeout).await?;
        ttl_from_pttl(key, remaining)
    }

    /// Flushes the selected database.
    pub async fn clear(&self) -> CacheResult<()> {
        let _: () = self.query(&redis::cmd("FLUSHDB"), self.write_timeout).await?;
        Ok(())
    }

    pub fn stats(&self) -> RedisPoolStats {
        let state = self.pool.state();
        RedisPoolStats {
            address: self.address.clone(),
            connections: state.connections,
            idle_connections: state.idle_connections,
            max_size: self.pool_size,
        }
    }

    /// Stops the health check. Pooled connections close when the pool drops.
    pub async fn close(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.health_check.lock().await.take() {
            let _ = handle.await;
        }
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("address", &self.address)
            .field("pool_size", &self.pool_size)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Maps a `PTTL` reply: -2 is a missing key, -1 a key without expiry.
fn ttl_from_pttl(key: &str, remaining_ms: i64) -> CacheResult<Duration> {
    match remaining_ms {
        -2 => Err(CacheError::NotFound(key.to_string())),
        -1 => Ok(Duration::MAX),
        ms if ms < 0 => Ok(Duration::ZERO),
        ms => Ok(Duration::from_millis(ms as u64)),
    }
}

// == Health Check ==
/// Pings on every tick and logs state changes. Never triggers failover.
fn spawn_health_check(
    pool: Pool<RedisConnectionManager>,
    address: String,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut healthy = true;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }

            match ping_once(&pool).await {
                Ok(()) if !healthy => {
                    healthy = true;
                    info!(address = %address, "Redis health check recovered");
                }
                Ok(()) => debug!(address = %address, "Redis health check ok"),
                Err(e) => {
                    healthy = false;
                    warn!(address = %address, error = %e, "Redis health check failed");
                }
            }
        }
    })
}

async fn ping_once(pool: &Pool<RedisConnectionManager>) -> Result<(), String> {
    let mut conn = pool.get().await.map_err(|e| e.to_string())?;
    let _: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}
