//! Cache Controller Module
//!
//! Ties key derivation, storage, eviction and the background tasks together
//! behind the cache-aside, write-through and write-behind operations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    derive_key, enforce_capacity, measure, sweep_expired, CacheEntry, CacheKey, CacheStats, Clock,
    Param, StatsRecorder, StorageMap, SystemClock,
};
use crate::config::CacheConfig;
use crate::error::{BoxError, CacheError, Result};
use crate::tasks::{spawn_flush_worker, spawn_maintenance_task, PendingWrite, WriteBehindSink};

// == Cache Core ==
/// State shared between the controller handles and its background tasks.
#[derive(Debug)]
pub struct CacheCore<V> {
    store: StorageMap<V>,
    stats: StatsRecorder,
    clock: Arc<dyn Clock>,
    max_capacity_bytes: usize,
}

impl<V> CacheCore<V>
where
    V: Serialize + Clone + Send + Sync + 'static,
{
    fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: StorageMap::new(),
            stats: StatsRecorder::new(),
            clock,
            max_capacity_bytes: config.max_capacity_bytes,
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    // == Lookup ==
    /// Returns the live value for `key`, recording a hit or a miss.
    ///
    /// An expired entry is removed on the spot and reported as a miss.
    async fn lookup(&self, key: &CacheKey) -> Option<V> {
        let found = self.lookup_quiet(key).await;
        match found {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        found
    }

    /// Like [`Self::lookup`] without touching the hit/miss counters.
    async fn lookup_quiet(&self, key: &CacheKey) -> Option<V> {
        let now = self.now_ms();
        let mut entries = self.store.write().await;

        let expired = entries.get(key)?.is_expired_at(now);
        if expired {
            entries.remove(key);
            self.stats.set_gauges(entries.total_size(), entries.len());
            self.stats.record_expirations(1);
            return None;
        }

        entries.touch(key, now).map(|entry| entry.value.clone())
    }

    // == Insert ==
    /// Stores `entry`, evicting least recently used entries to make room.
    async fn insert(&self, entry: CacheEntry<V>) {
        let key = entry.key.clone();
        let size = entry.size_bytes;

        let evicted = {
            let mut entries = self.store.write().await;
            // A replaced entry frees its own bytes first
            entries.remove(&key);
            let evicted = enforce_capacity(&mut entries, size, self.max_capacity_bytes);
            entries.insert(entry);
            self.stats.set_gauges(entries.total_size(), entries.len());
            evicted
        };

        if size > self.max_capacity_bytes {
            warn!(
                key = %key,
                size_bytes = size,
                max_capacity_bytes = self.max_capacity_bytes,
                "Entry exceeds cache capacity, stored alone"
            );
        }
        if !evicted.is_empty() {
            self.stats.record_evictions(evicted.len());
            debug!(evicted = evicted.len(), "Evicted entries to stay within capacity");
        }
    }

    async fn remove(&self, key: &CacheKey) -> bool {
        let mut entries = self.store.write().await;
        let removed = entries.remove(key).is_some();
        self.stats.set_gauges(entries.total_size(), entries.len());
        removed
    }

    // == Sweep Expired ==
    /// Removes all expired entries and returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.now_ms();
        let removed = {
            let mut entries = self.store.write().await;
            let removed = sweep_expired(&mut entries, now);
            self.stats.set_gauges(entries.total_size(), entries.len());
            removed
        };

        self.stats.record_expirations(removed.len());
        removed.len()
    }
}

// == In-Flight Table ==
/// Per-key locks used to coalesce concurrent misses.
#[derive(Debug, Default)]
struct InFlight {
    locks: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl InFlight {
    async fn acquire(&self, key: &CacheKey) -> InFlightGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.clone()).or_default().clone()
        };
        let held = lock.clone().lock_owned().await;

        InFlightGuard {
            table: self,
            key: key.clone(),
            lock,
            held: Some(held),
        }
    }
}

/// Holds the per-key lock; the table slot is dropped with the last holder.
struct InFlightGuard<'a> {
    table: &'a InFlight,
    key: CacheKey,
    lock: Arc<tokio::sync::Mutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.held.take();

        let mut locks = self
            .table
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the table and this guard still refer to the lock
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

// == Background Runtime ==
struct Background<V> {
    shutdown_tx: broadcast::Sender<()>,
    write_tx: RwLock<Option<mpsc::Sender<PendingWrite<V>>>>,
    write_capacity: usize,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<V> Drop for Background<V> {
    fn drop(&mut self) {
        for handle in self.tasks.get_mut().drain(..) {
            handle.abort();
        }
    }
}

// == Cache Controller ==
/// In-process query result cache.
///
/// Cloning is cheap and every clone drives the same cache. Background tasks
/// stop on [`CacheController::shutdown`], or are aborted when the last
/// clone is dropped.
pub struct CacheController<V> {
    core: Arc<CacheCore<V>>,
    background: Arc<Background<V>>,
    in_flight: Arc<InFlight>,
    default_ttl: Duration,
    coalesce_misses: bool,
}

impl<V> Clone for CacheController<V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            background: Arc::clone(&self.background),
            in_flight: Arc::clone(&self.in_flight),
            default_ttl: self.default_ttl,
            coalesce_misses: self.coalesce_misses,
        }
    }
}

impl<V> std::fmt::Debug for CacheController<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheController")
            .field("default_ttl", &self.default_ttl)
            .field("coalesce_misses", &self.coalesce_misses)
            .field("stats", &self.core.stats.snapshot())
            .finish()
    }
}

impl<V> CacheController<V>
where
    V: Serialize + Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a controller with the system clock and no write-behind sink.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: CacheConfig) -> CacheControllerBuilder<V> {
        CacheControllerBuilder {
            config,
            clock: Arc::new(SystemClock),
            sink: None,
        }
    }

    // == Get Or Compute ==
    /// Cache-aside read.
    ///
    /// Returns the cached value for `(query, params)` if it is live.
    /// Otherwise awaits `compute` outside of any cache lock, caches a
    /// successful result for `ttl` (or the default TTL) and returns it. A
    /// failed compute is returned as [`CacheError::Compute`] and nothing is
    /// cached. A result that cannot be serialized is returned but not cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        query: &str,
        params: &[Param<'_>],
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<BoxError>,
    {
        let key = derive_key(query, params);
        if let Some(value) = self.core.lookup_quiet(&key).await {
            self.core.stats.record_hit();
            return Ok(value);
        }

        let _guard = if self.coalesce_misses {
            let guard = self.in_flight.acquire(&key).await;
            // Another caller may have filled the entry while we waited
            if let Some(value) = self.core.lookup_quiet(&key).await {
                self.core.stats.record_hit();
                return Ok(value);
            }
            Some(guard)
        } else {
            None
        };

        self.core.stats.record_miss();
        self.core.stats.record_compute();
        let value = compute().await.map_err(CacheError::compute)?;

        let now = self.core.now_ms();
        match CacheEntry::new(key.clone(), value.clone(), now, self.ttl_or_default(ttl)) {
            Ok(entry) => self.core.insert(entry).await,
            Err(err) => warn!(key = %key, error = %err, "Computed value not cached"),
        }

        Ok(value)
    }

    // == Lookup ==
    /// Cache-only read; never computes.
    pub async fn lookup(&self, query: &str, params: &[Param<'_>]) -> Option<V> {
        self.lookup_key(&derive_key(query, params)).await
    }

    pub async fn lookup_key(&self, key: &CacheKey) -> Option<V> {
        self.core.lookup(key).await
    }

    // == Put (write-through) ==
    /// Write-through: persists `value` first and caches it only on success.
    ///
    /// The value is measured before `persist` runs, so an unserializable
    /// value is rejected without being persisted. On persist failure the
    /// cache is left untouched.
    pub async fn put<F, Fut, E>(
        &self,
        query: &str,
        params: &[Param<'_>],
        value: V,
        ttl: Option<Duration>,
        persist: F,
    ) -> Result<()>
    where
        F: FnOnce(V) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Into<BoxError>,
    {
        let key = derive_key(query, params);
        let size = measure(&value)?;

        persist(value.clone()).await.map_err(CacheError::persist)?;

        let entry = CacheEntry::with_size(key, value, self.core.now_ms(), self.ttl_or_default(ttl), size);
        self.core.insert(entry).await;
        Ok(())
    }

    // == Put Async (write-behind) ==
    /// Write-behind: caches `value` now and queues it for batched persistence.
    ///
    /// Never waits for buffer space. A full buffer yields
    /// [`CacheError::Backpressure`] and the cache is left untouched.
    pub async fn put_async(
        &self,
        query: &str,
        params: &[Param<'_>],
        value: V,
        ttl: Option<Duration>,
    ) -> Result<CacheKey> {
        let key = derive_key(query, params);
        let size = measure(&value)?;

        let sender = self
            .background
            .write_tx
            .read()
            .await
            .clone()
            .ok_or(CacheError::WriteBehindUnavailable)?;
        let permit = sender.try_reserve().map_err(|err| match err {
            mpsc::error::TrySendError::Full(()) => CacheError::Backpressure {
                capacity: self.background.write_capacity,
            },
            mpsc::error::TrySendError::Closed(()) => CacheError::WriteBehindUnavailable,
        })?;

        let now = self.core.now_ms();
        let entry = CacheEntry::with_size(key.clone(), value.clone(), now, self.ttl_or_default(ttl), size);
        self.core.insert(entry).await;

        permit.send(PendingWrite {
            key: key.clone(),
            value,
            enqueued_at: now,
        });
        Ok(key)
    }

    // == Invalidate ==
    /// Removes the entry for `(query, params)`; returns whether one existed.
    pub async fn invalidate(&self, query: &str, params: &[Param<'_>]) -> bool {
        self.invalidate_key(&derive_key(query, params)).await
    }

    pub async fn invalidate_key(&self, key: &CacheKey) -> bool {
        let removed = self.core.remove(key).await;
        if removed {
            debug!(key = %key, "Invalidated cache entry");
        }
        removed
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.core.stats()
    }

    /// Runs one expiry sweep immediately; returns the number removed.
    pub async fn sweep_expired(&self) -> usize {
        self.core.sweep_expired().await
    }

    pub async fn len(&self) -> usize {
        self.core.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.core.store.is_empty().await
    }

    /// Copy of the raw entry for `key`, expired or not.
    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.core.store.get(key).await
    }

    // == Shutdown ==
    /// Stops the background tasks and waits for them to finish.
    ///
    /// Pending write-behind values are flushed before this returns. Later
    /// `put_async` calls fail with [`CacheError::WriteBehindUnavailable`];
    /// every other operation keeps working on the in-memory map.
    pub async fn shutdown(&self) {
        self.background.write_tx.write().await.take();
        // No receivers left means the tasks are already gone
        let _ = self.background.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.background.tasks.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Background task ended abnormally");
            }
        }
        info!("Cache controller shut down");
    }

    #[cfg(test)]
    pub(crate) async fn running_tasks(&self) -> usize {
        self.background
            .tasks
            .lock()
            .await
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    fn ttl_or_default(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.default_ttl)
    }
}

// == Builder ==
/// Configures optional collaborators before starting a controller.
pub struct CacheControllerBuilder<V> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn WriteBehindSink<V>>>,
}

impl<V> CacheControllerBuilder<V>
where
    V: Serialize + Clone + Send + Sync + 'static,
{
    /// Replaces the system clock, typically with a `ManualClock` in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enables `put_async`, persisting batches through `sink`.
    pub fn write_behind(mut self, sink: Arc<dyn WriteBehindSink<V>>) -> Self {
        self.sink = Some(sink);
        self
    }

    // == Build ==
    /// Validates the config and starts the background tasks.
    pub fn build(self) -> Result<CacheController<V>> {
        let config = self.config;
        config.validate()?;

        let core = Arc::new(CacheCore::new(&config, self.clock));
        let (shutdown_tx, _) = broadcast::channel(1);

        let mut tasks = vec![spawn_maintenance_task(
            Arc::clone(&core),
            config.sweep_interval,
            shutdown_tx.subscribe(),
        )];

        let write_tx = self.sink.map(|sink| {
            let (tx, rx) = mpsc::channel(config.write_behind_buffer_size);
            tasks.push(spawn_flush_worker(
                sink,
                rx,
                config.write_behind_buffer_size,
                config.write_behind_flush_interval,
                shutdown_tx.subscribe(),
            ));
            tx
        });

        info!(
            max_capacity_bytes = config.max_capacity_bytes,
            default_ttl_ms = config.default_ttl.as_millis() as u64,
            write_behind = write_tx.is_some(),
            coalesce_misses = config.coalesce_misses,
            "Cache controller started"
        );

        Ok(CacheController {
            core,
            background: Arc::new(Background {
                shutdown_tx,
                write_tx: RwLock::new(write_tx),
                write_capacity: config.write_behind_buffer_size,
                tasks: tokio::sync::Mutex::new(tasks),
            }),
            in_flight: Arc::new(InFlight::default()),
            default_ttl: config.default_ttl,
            coalesce_misses: config.coalesce_misses,
        })
    }
}
