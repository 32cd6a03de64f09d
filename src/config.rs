//! Configuration Module
//!
//! Loads server, cache and cleanup settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default lifetime of a session's answer buffer, comfortably above any exam duration.
pub const DEFAULT_ANSWER_BUFFER_TTL_SECS: u64 = 2 * 60 * 60;

pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CLEANUP_GRACE_PERIOD_SECS: u64 = 120;

// == Cache Backend ==
/// Which cache backend the factory should try to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis,
}

impl CacheBackend {
    /// Parses a backend name; anything unrecognised selects the in-process backend.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => CacheBackend::Redis,
            _ => CacheBackend::Memory,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBackend::Memory => "memory",
            CacheBackend::Redis => "redis",
        }
    }
}

// == Redis Config ==
/// Connection and pool settings for the networked cache backend.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    /// Maximum pooled connections
    pub pool_size: u32,
    /// Idle connections kept ready
    pub min_idle_conns: u32,
    /// Retries for a failed command
    pub max_retries: u32,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Longest a caller waits for a pooled connection
    pub pool_timeout: Duration,
    pub idle_timeout: Duration,
    /// None keeps connections until they fail
    pub max_conn_age: Option<Duration>,
}

impl RedisConfig {
    /// Replaces zero-valued pool settings with the defaults.
    pub fn with_defaults(mut self) -> Self {
        let defaults = RedisConfig::default();
        if self.pool_size == 0 {
            self.pool_size = defaults.pool_size;
        }
        if self.min_idle_conns == 0 {
            self.min_idle_conns = defaults.min_idle_conns;
        }
        if self.max_retries == 0 {
            self.max_retries = defaults.max_retries;
        }
        if self.dial_timeout.is_zero() {
            self.dial_timeout = defaults.dial_timeout;
        }
        if self.read_timeout.is_zero() {
            self.read_timeout = defaults.read_timeout;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = defaults.write_timeout;
        }
        if self.pool_timeout.is_zero() {
            self.pool_timeout = defaults.pool_timeout;
        }
        if self.idle_timeout.is_zero() {
            self.idle_timeout = defaults.idle_timeout;
        }
        self.min_idle_conns = self.min_idle_conns.min(self.pool_size);
        self
    }

    /// `host:port`, used in log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection URL understood by the redis client.
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db)
            }
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            pool_size: 10,
            min_idle_conns: 5,
            max_retries: 3,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
            pool_timeout: Duration::from_secs(4),
            idle_timeout: Duration::from_secs(5 * 60),
            max_conn_age: None,
        }
    }
}

// == Cache Config ==
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// In-process byte limit in MB (0 = unlimited)
    pub max_memory_mb: u64,
    /// In-process item limit (0 = unlimited)
    pub max_items: usize,
    pub redis: RedisConfig,
}

impl CacheConfig {
    /// Settings for the in-process backend only.
    pub fn memory(max_memory_mb: u64, max_items: usize) -> Self {
        Self {
            backend: CacheBackend::Memory,
            max_memory_mb,
            max_items,
            redis: RedisConfig::default(),
        }
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::memory(64, 10_000)
    }
}

// == Cleanup Config ==
/// Settings for the abandoned-session sweep.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub grace_period: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            grace_period: Duration::from_secs(DEFAULT_CLEANUP_GRACE_PERIOD_SECS),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Load a sample exam into the in-process store on startup
    pub seed_demo_data: bool,
    /// TTL applied to every answer buffer write
    pub answer_buffer_ttl: Duration,
    pub cache: CacheConfig,
    pub cleanup: CleanupConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` (default: 3000)
    /// - `SEED_DEMO_DATA` (default: true)
    /// - `ANSWER_BUFFER_TTL_SECS` (default: 7200)
    /// - `CACHE_BACKEND` - `memory` or `redis` (default: memory)
    /// - `CACHE_MAX_MEMORY_MB` (default: 64), `CACHE_MAX_ITEMS` (default: 10000)
    /// - `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DB`
    /// - `REDIS_POOL_SIZE`, `REDIS_MIN_IDLE_CONNS`, `REDIS_MAX_RETRIES`
    /// - `REDIS_DIAL_TIMEOUT_SECS`, `REDIS_READ_TIMEOUT_SECS`, `REDIS_WRITE_TIMEOUT_SECS`,
    ///   `REDIS_POOL_TIMEOUT_SECS`, `REDIS_IDLE_TIMEOUT_SECS`, `REDIS_MAX_CONN_AGE_SECS`
    /// - `CLEANUP_ENABLED` (default: true), `CLEANUP_INTERVAL_SECS` (default: 60),
    ///   `CLEANUP_GRACE_PERIOD_SECS` (default: 120)
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let redis = RedisConfig {
            host: env::var("REDIS_HOST").unwrap_or(defaults.cache.redis.host),
            port: env_or("REDIS_PORT", defaults.cache.redis.port),
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            db: env_or("REDIS_DB", defaults.cache.redis.db),
            pool_size: env_or("REDIS_POOL_SIZE", 0),
            min_idle_conns: env_or("REDIS_MIN_IDLE_CONNS", 0),
            max_retries: env_or("REDIS_MAX_RETRIES", 0),
            dial_timeout: env_secs("REDIS_DIAL_TIMEOUT_SECS", 0),
            read_timeout: env_secs("REDIS_READ_TIMEOUT_SECS", 0),
            write_timeout: env_secs("REDIS_WRITE_TIMEOUT_SECS", 0),
            pool_timeout: env_secs("REDIS_POOL_TIMEOUT_SECS", 0),
            idle_timeout: env_secs("REDIS_IDLE_TIMEOUT_SECS", 0),
            max_conn_age: Some(env_secs("REDIS_MAX_CONN_AGE_SECS", 0)).filter(|d| !d.is_zero()),
        }
        .with_defaults();

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            seed_demo_data: env_or("SEED_DEMO_DATA", defaults.seed_demo_data),
            answer_buffer_ttl: env_nonzero_secs(
                "ANSWER_BUFFER_TTL_SECS",
                DEFAULT_ANSWER_BUFFER_TTL_SECS,
            ),
            cache: CacheConfig {
                backend: env::var("CACHE_BACKEND")
                    .map(|v| CacheBackend::parse(&v))
                    .unwrap_or(defaults.cache.backend),
                max_memory_mb: env_or("CACHE_MAX_MEMORY_MB", defaults.cache.max_memory_mb),
                max_items: env_or("CACHE_MAX_ITEMS", defaults.cache.max_items),
                redis,
            },
            cleanup: CleanupConfig {
                enabled: env_or("CLEANUP_ENABLED", defaults.cleanup.enabled),
                interval: env_nonzero_secs("CLEANUP_INTERVAL_SECS", DEFAULT_CLEANUP_INTERVAL_SECS),
                grace_period: env_secs(
                    "CLEANUP_GRACE_PERIOD_SECS",
                    DEFAULT_CLEANUP_GRACE_PERIOD_SECS,
                ),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            seed_demo_data: true,
            answer_buffer_ttl: Duration::from_secs(DEFAULT_ANSWER_BUFFER_TTL_SECS),
            cache: CacheConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_or(name, default_secs))
}

/// Like [`env_secs`], but zero counts as unset.
fn env_nonzero_secs(name: &str, default_secs: u64) -> Duration {
    match env_or(name, default_secs) {
        0 => Duration::from_secs(default_secs),
        secs => Duration::from_secs(secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.answer_buffer_ttl, Duration::from_secs(7200));
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cleanup.interval, Duration::from_secs(60));
        assert_eq!(config.cleanup.grace_period, Duration::from_secs(120));
        assert!(config.cleanup.enabled);
    }

    #[test]
    fn test_config_from_env_defaults() {
        for name in [
            "SERVER_PORT",
            "CACHE_BACKEND",
            "CACHE_MAX_ITEMS",
            "REDIS_POOL_SIZE",
            "CLEANUP_INTERVAL_SECS",
            "CLEANUP_GRACE_PERIOD_SECS",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.max_items, 10_000);
        assert_eq!(config.cache.redis.pool_size, 10);
        assert_eq!(config.cleanup.interval, Duration::from_secs(60));
        assert_eq!(config.cleanup.grace_period, Duration::from_secs(120));
    }

    #[test]
    fn test_zero_seconds_count_as_unset() {
        env::set_var("EXAM_SESSIONS_TEST_ZERO_SECS", "0");
        env::set_var("EXAM_SESSIONS_TEST_SOME_SECS", "15");

        assert_eq!(
            env_nonzero_secs("EXAM_SESSIONS_TEST_ZERO_SECS", 60),
            Duration::from_secs(60)
        );
        assert_eq!(
            env_nonzero_secs("EXAM_SESSIONS_TEST_SOME_SECS", 60),
            Duration::from_secs(15)
        );
        assert_eq!(env_secs("EXAM_SESSIONS_TEST_ZERO_SECS", 60), Duration::ZERO);
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(CacheBackend::parse("redis"), CacheBackend::Redis);
        assert_eq!(CacheBackend::parse(" REDIS "), CacheBackend::Redis);
        assert_eq!(CacheBackend::parse("memory"), CacheBackend::Memory);
        assert_eq!(CacheBackend::parse("memcached"), CacheBackend::Memory);
    }

    #[test]
    fn test_redis_zero_values_fall_back_to_defaults() {
        let config = RedisConfig {
            pool_size: 0,
            min_idle_conns: 0,
            max_retries: 0,
            dial_timeout: Duration::ZERO,
            pool_timeout: Duration::ZERO,
            ..RedisConfig::default()
        }
        .with_defaults();

        assert_eq!(config.pool_size, 10);
        assert_eq!(config.min_idle_conns, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.dial_timeout, Duration::from_secs(5));
        assert_eq!(config.pool_timeout, Duration::from_secs(4));
    }

    #[test]
    fn test_min_idle_capped_by_pool_size() {
        let config = RedisConfig {
            pool_size: 2,
            min_idle_conns: 8,
            ..RedisConfig::default()
        }
        .with_defaults();
        assert_eq!(config.min_idle_conns, 2);
    }

    #[test]
    fn test_connection_url() {
        let mut config = RedisConfig::default();
        assert_eq!(config.connection_url(), "redis://localhost:6379/0");

        config.password = Some("secret".to_string());
        config.db = 2;
        assert_eq!(config.connection_url(), "redis://:secret@localhost:6379/2");
        assert_eq!(config.address(), "localhost:6379");
    }
}
