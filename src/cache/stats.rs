//! Cache Statistics Module
//!
//! Hit/miss counters for the in-process backend and a serializable snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Stats Counters ==
/// Counters updated under a shared lock, hence atomic.
#[derive(Debug, Default)]
pub struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removed: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: u64) {
        self.expired_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expired_removed(&self) -> u64 {
        self.expired_removed.load(Ordering::Relaxed)
    }
}

// == Cache Stats ==
/// Point-in-time view of the in-process backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Live entries dropped to make room for a write
    pub evictions: u64,
    /// Expired entries reclaimed lazily, by the sweep, or before eviction
    pub expired_removed: u64,
    pub items: usize,
    pub memory_bytes: u64,
    /// 0 = unlimited
    pub max_memory_bytes: u64,
    /// 0 = unlimited
    pub max_items: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = StatsCounters::new();
        assert_eq!(counters.hits(), 0);
        assert_eq!(counters.misses(), 0);
        assert_eq!(counters.evictions(), 0);
        assert_eq!(counters.expired_removed(), 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let counters = StatsCounters::new();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        counters.record_evictions(3);
        counters.record_expired(2);

        assert_eq!(counters.hits(), 2);
        assert_eq!(counters.misses(), 1);
        assert_eq!(counters.evictions(), 3);
        assert_eq!(counters.expired_removed(), 2);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.hits = 3;
        stats.misses = 1;
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
