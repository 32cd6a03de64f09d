//! Cache Module
//!
//! Key/value storage with expiration behind one interface, backed either by
//! a bounded in-process store or by a networked Redis-compatible server.
//!
//! ```text
//! Cache (enum)
//!   ├── Memory(MemoryCache)  <- RwLock'd map, byte + item limits, 5 min sweep
//!   └── Redis(RedisCache)    <- bb8 pool, 30s health check
//! ```
//!
//! The backend is chosen once by [`Cache::from_config`]. A networked backend
//! that cannot be reached at construction degrades to the in-process one.

mod entry;
mod memory;
mod order;
mod provider;
mod redis;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, entry_size, CacheEntry, ENTRY_OVERHEAD_BYTES};
pub use memory::{Lookup, MemoryCache, MemoryStore, SWEEP_INTERVAL};
pub use order::WriteOrder;
pub use provider::{Cache, CacheStatsReport, CacheStore};
pub use redis::{RedisCache, RedisPoolStats, HEALTH_CHECK_INTERVAL};
pub use stats::{CacheStats, StatsCounters};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
