//! Maintenance Task
//!
//! Background task that periodically sweeps expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::CacheCore;

/// Spawns the task that sweeps expired entries every `interval`.
///
/// The first sweep happens one full interval after spawning. The task exits
/// as soon as anything arrives on `shutdown` (or its sender is dropped).
pub(crate) fn spawn_maintenance_task<V>(
    core: Arc<CacheCore<V>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()>
where
    V: Serialize + Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting cache maintenance task"
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Cache maintenance task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = core.sweep_expired().await;
                    let stats = core.stats();

                    if removed > 0 {
                        info!(
                            removed,
                            entries = stats.current_count,
                            size_bytes = stats.current_size,
                            "TTL sweep removed expired entries"
                        );
                    } else {
                        debug!("TTL sweep: no expired entries found");
                    }
                }
            }
        }
    })
}
