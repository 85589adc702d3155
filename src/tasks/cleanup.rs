//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries and the
//! tag memberships they leave behind.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::MemoryCacheStore;

/// Spawns a task running [`MemoryCacheStore::cleanup_expired`] every `interval`.
///
/// The task stops when `shutdown` is cancelled. Expired entries already read
/// as misses, so the task only bounds how long they occupy memory.
pub fn spawn_cleanup_task(
    cache: MemoryCacheStore,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting TTL cleanup task");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("TTL cleanup task stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = cache.cleanup_expired().await;
                    if removed > 0 {
                        info!(removed, "TTL cleanup removed expired entries");
                    } else {
                        debug!("TTL cleanup found no expired entries");
                    }
                }
            }
        }
    })
}
