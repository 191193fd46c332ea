//! Write-Behind Flush Worker
//!
//! Drains the write-behind buffer and hands batches to a persistence sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::CacheKey;
use crate::error::BoxError;

// == Pending Write ==
/// A value already visible in the cache, waiting to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite<V> {
    pub key: CacheKey,
    pub value: V,
    /// Clock reading when the write was accepted (Unix milliseconds)
    pub enqueued_at: u64,
}

// == Write-Behind Sink ==
/// Backing store that receives write-behind batches.
#[async_trait]
pub trait WriteBehindSink<V>: Send + Sync + 'static {
    /// Persists one batch. Errors are logged and the batch is dropped.
    async fn persist_batch(&self, batch: Vec<PendingWrite<V>>) -> Result<(), BoxError>;
}

/// Sink that only logs what it receives.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl<V: Send + 'static> WriteBehindSink<V> for TracingSink {
    async fn persist_batch(&self, batch: Vec<PendingWrite<V>>) -> Result<(), BoxError> {
        for write in &batch {
            debug!(key = %write.key, enqueued_at = write.enqueued_at, "write-behind entry");
        }
        info!(writes = batch.len(), "Flushed write-behind batch");
        Ok(())
    }
}

/// Spawns the single consumer of the write-behind buffer.
///
/// A batch is flushed when it reaches `batch_size`, when `flush_interval`
/// elapses with writes pending, and once more on shutdown after the buffer
/// has been drained.
pub(crate) fn spawn_flush_worker<V>(
    sink: Arc<dyn WriteBehindSink<V>>,
    mut rx: mpsc::Receiver<PendingWrite<V>>,
    batch_size: usize,
    flush_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()>
where
    V: Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + flush_interval,
            flush_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buffer: Vec<PendingWrite<V>> = Vec::with_capacity(batch_size);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    // Writes holding a reserved slot still arrive after close
                    rx.close();
                    while let Some(write) = rx.recv().await {
                        buffer.push(write);
                    }
                    break;
                }
                received = rx.recv() => match received {
                    Some(write) => {
                        buffer.push(write);
                        if buffer.len() >= batch_size {
                            flush(sink.as_ref(), &mut buffer).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        flush(sink.as_ref(), &mut buffer).await;
                    }
                }
            }
        }

        if !buffer.is_empty() {
            flush(sink.as_ref(), &mut buffer).await;
        }
        debug!("Write-behind worker stopped");
    })
}

async fn flush<V: Send + 'static>(sink: &dyn WriteBehindSink<V>, buffer: &mut Vec<PendingWrite<V>>) {
    let batch = std::mem::take(buffer);
    let size = batch.len();

    if let Err(err) = sink.persist_batch(batch).await {
        warn!(writes = size, error = %err, "Write-behind batch failed to persist");
    }
}
