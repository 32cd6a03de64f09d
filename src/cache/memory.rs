//! In-Process Cache Backend
//!
//! A bounded map with two independent limits (total bytes and item count) and
//! lazy plus periodic expiry. All state sits behind one reader/writer lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::entry::{current_timestamp_ms, entry_size, CacheEntry};
use crate::cache::order::WriteOrder;
use crate::cache::stats::{CacheStats, StatsCounters};
use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, CacheResult};
use crate::tasks::spawn_expiry_sweep;

/// Interval of the background expiry sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// == Lookup ==
/// Result of a read under the shared lock.
#[derive(Debug)]
pub enum Lookup<'a> {
    Live(&'a CacheEntry),
    Expired,
    Missing,
}

// == Memory Store ==
/// Synchronous storage engine; [`MemoryCache`] wraps it in a lock.
#[derive(Debug)]
pub struct MemoryStore {
    entries: HashMap<String, CacheEntry>,
    order: WriteOrder,
    counters: StatsCounters,
    memory_bytes: u64,
    /// 0 = unlimited
    max_memory_bytes: u64,
    /// 0 = unlimited
    max_items: usize,
}

impl MemoryStore {
    pub fn new(max_memory_bytes: u64, max_items: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: WriteOrder::new(),
            counters: StatsCounters::new(),
            memory_bytes: 0,
            max_memory_bytes,
            max_items,
        }
    }

    // == Lookup ==
    /// Reads without mutating the map. Hits and misses are counted here.
    pub fn lookup(&self, key: &str) -> Lookup<'_> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                self.counters.record_miss();
                Lookup::Expired
            }
            Some(entry) => {
                self.counters.record_hit();
                Lookup::Live(entry)
            }
            None => {
                self.counters.record_miss();
                Lookup::Missing
            }
        }
    }

    // == Insert ==
    /// Stores `value` under `key`, overwriting any previous entry.
    ///
    /// When the write would break a limit, expired entries are dropped first,
    /// then the oldest-written entries. A value that cannot fit even in an
    /// empty store is rejected with `LimitExceeded` and nothing is evicted.
    pub fn insert(&mut self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        validate_key(key)?;
        if ttl.is_zero() {
            return Err(CacheError::InvalidRequest(
                "TTL must be greater than zero".to_string(),
            ));
        }

        let size = entry_size(key, &value);
        if self.max_memory_bytes > 0 && size > self.max_memory_bytes {
            return Err(CacheError::LimitExceeded(format!(
                "Entry of {} bytes exceeds the {} byte limit",
                size, self.max_memory_bytes
            )));
        }

        if !self.fits(key, size) {
            self.purge_expired();
        }

        let mut evicted = 0;
        while !self.fits(key, size) {
            let Some(oldest) = self.order.pop_oldest_except(key) else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.memory_bytes -= entry_size(&oldest, &entry.value);
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.counters.record_evictions(evicted);
            debug!(evicted, key, "Evicted oldest entries to make room");
        }

        if !self.fits(key, size) {
            return Err(CacheError::LimitExceeded(format!(
                "No room for {} bytes under key {}",
                size, key
            )));
        }

        self.remove_entry(key);
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        self.order.record(key);
        self.memory_bytes += size;

        Ok(())
    }

    /// Would the store stay within both limits if `key` were (re)written with `size` bytes?
    fn fits(&self, key: &str, size: u64) -> bool {
        let (existing_bytes, existing_items) = match self.entries.get(key) {
            Some(entry) => (entry_size(key, &entry.value), 1),
            None => (0, 0),
        };

        let bytes_after = self.memory_bytes - existing_bytes + size;
        let items_after = self.entries.len() - existing_items + 1;

        (self.max_memory_bytes == 0 || bytes_after <= self.max_memory_bytes)
            && (self.max_items == 0 || items_after <= self.max_items)
    }

    // == Remove ==
    /// Removes `key`; returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(key);
        self.memory_bytes -= entry_size(key, &entry.value);
        Some(entry)
    }

    /// Removes `key` only if it is still expired. Another writer may have
    /// replaced it between the shared read and this exclusive call.
    pub fn remove_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);

        if expired {
            self.remove_entry(key);
            self.counters.record_expired(1);
        }
        expired
    }

    // == Purge Expired ==
    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
        }

        self.counters.record_expired(expired.len() as u64);
        expired.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.memory_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits(),
            misses: self.counters.misses(),
            evictions: self.counters.evictions(),
            expired_removed: self.counters.expired_removed(),
            items: self.entries.len(),
            memory_bytes: self.memory_bytes,
            max_memory_bytes: self.max_memory_bytes,
            max_items: self.max_items,
        }
    }
}

fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

// == Memory Cache ==
/// Shared, lock-guarded [`MemoryStore`] plus its background expiry sweep.
#[derive(Debug)]
pub struct MemoryCache {
    store: Arc<RwLock<MemoryStore>>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCache {
    /// Creates the backend and starts the 5-minute expiry sweep.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(max_memory_bytes: u64, max_items: usize) -> Self {
        Self::with_sweep_interval(max_memory_bytes, max_items, SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(max_memory_bytes: u64, max_items: usize, interval: Duration) -> Self {
        let store = Arc::new(RwLock::new(MemoryStore::new(max_memory_bytes, max_items)));
        let shutdown = CancellationToken::new();
        let handle = spawn_expiry_sweep(store.clone(), interval, shutdown.clone());

        Self {
            store,
            shutdown,
            sweeper: Mutex::new(Some(handle)),
        }
    }

    // == Get ==
    pub async fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        {
            let store = self.store.read().await;
            match store.lookup(key) {
                Lookup::Live(entry) => return Ok(entry.value.clone()),
                Lookup::Missing => return Err(CacheError::NotFound(key.to_string())),
                Lookup::Expired => {}
            }
        }

        self.store.write().await.remove_if_expired(key);
        Err(CacheError::Expired(key.to_string()))
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.store.write().await.insert(key, value, ttl)
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        if self.store.write().await.remove(key) {
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        let store = self.store.read().await;
        matches!(store.lookup(key), Lookup::Live(_))
    }

    // == TTL ==
    pub async fn ttl(&self, key: &str) -> CacheResult<Duration> {
        {
            let store = self.store.read().await;
            match store.lookup(key) {
                Lookup::Live(entry) => return Ok(entry.ttl_remaining()),
                Lookup::Missing => return Err(CacheError::NotFound(key.to_string())),
                Lookup::Expired => {}
            }
        }

        self.store.write().await.remove_if_expired(key);
        Err(CacheError::Expired(key.to_string()))
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    // == Close ==
    /// Stops the expiry sweep and waits for it to exit. Safe to call twice.
    pub async fn close(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.sweeper.lock().await.take() {
            let _ = handle.await;
        }
    }
}
