//! Storage Map Module
//!
//! Concurrency-safe key -> entry storage with a running size counter and
//! LRU bookkeeping. Expiry is not checked here; callers decide what an
//! expired entry means.

use std::collections::HashMap;

use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::cache::{CacheEntry, CacheKey, LruTracker};

// == Entries ==
/// Unsynchronized storage. Always reached through a [`StorageMap`] guard.
#[derive(Debug)]
pub struct Entries<V> {
    map: HashMap<CacheKey, CacheEntry<V>>,
    lru: LruTracker,
    total_size: usize,
}

impl<V> Default for Entries<V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            lru: LruTracker::new(),
            total_size: 0,
        }
    }
}

impl<V> Entries<V> {
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry<V>> {
        self.map.get(key)
    }

    // == Insert ==
    /// Stores `entry`, replacing any entry with the same key.
    ///
    /// The entry becomes the most recently used one.
    pub fn insert(&mut self, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        let key = entry.key.clone();
        self.total_size += entry.size_bytes;
        self.lru.touch(&key);

        let previous = self.map.insert(key, entry);
        if let Some(old) = &previous {
            self.total_size -= old.size_bytes;
        }
        previous
    }

    // == Remove ==
    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let removed = self.map.remove(key)?;
        self.lru.remove(key);
        self.total_size -= removed.size_bytes;
        Some(removed)
    }

    // == Touch ==
    /// Records a hit on `key` at `now_ms` and returns the entry.
    pub fn touch(&mut self, key: &CacheKey, now_ms: u64) -> Option<&CacheEntry<V>> {
        let entry = self.map.get_mut(key)?;
        entry.touch(now_ms);
        self.lru.touch(key);
        Some(entry)
    }

    /// Least recently used key, if any.
    pub fn lru_candidate(&self) -> Option<&CacheKey> {
        self.lru.peek_oldest()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry<V>> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of `size_bytes` over all stored entries.
    pub fn total_size(&self) -> usize {
        self.total_size
    }
}

// == Storage Map ==
/// Shared storage guarded by a single reader/writer lock.
///
/// Reads take the shared lock; anything that mutates, including a hit
/// (which updates recency), takes the exclusive lock. Compound operations
/// lock once through [`StorageMap::write`].
#[derive(Debug)]
pub struct StorageMap<V> {
    inner: RwLock<Entries<V>>,
}

impl<V> Default for StorageMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> StorageMap<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Entries::default()),
        }
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Entries<V>> {
        self.inner.write().await
    }

    // == Get ==
    /// Returns a copy of the entry for `key`, expired or not.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>>
    where
        V: Clone,
    {
        self.inner.read().await.get(key).cloned()
    }

    // == Put ==
    /// Stores `entry`, overwriting any entry with the same key.
    pub async fn put(&self, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        self.inner.write().await.insert(entry)
    }

    // == Delete ==
    pub async fn delete(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.inner.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn total_size(&self) -> usize {
        self.inner.read().await.total_size()
    }
}
