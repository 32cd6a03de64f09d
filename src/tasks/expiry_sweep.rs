//! Cache Expiry Sweep
//!
//! Background task that periodically removes expired entries from the
//! in-process cache, so memory is reclaimed even when no writes arrive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::MemoryStore;

/// Spawns the expiry sweep for `store`.
///
/// The task sleeps for `interval` between runs and takes the write lock only
/// while purging. It exits as soon as `shutdown` is cancelled.
///
/// # Arguments
/// * `store` - Shared in-process store
/// * `interval` - Time between sweeps
/// * `shutdown` - Cancelled by `MemoryCache::close`
pub fn spawn_expiry_sweep(
    store: Arc<RwLock<MemoryStore>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(interval_secs = interval.as_secs(), "Starting cache expiry sweep");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Cache expiry sweep stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let removed = store.write().await.purge_expired();

            if removed > 0 {
                info!(removed, "Cache sweep removed expired entries");
            } else {
                debug!("Cache sweep found no expired entries");
            }
        }
    })
}
