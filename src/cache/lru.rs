//! LRU Tracker Module
//!
//! Orders cache keys by recency of access for LRU eviction.

use std::collections::{BTreeMap, HashMap};

use crate::cache::CacheKey;

// == LRU Tracker ==
/// Tracks access order for LRU eviction.
///
/// Every touch stamps the key with a fresh, strictly increasing sequence
/// number. The smallest live stamp is the least recently used key, so two
/// accesses within the same millisecond still order deterministically.
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Sequence stamp -> key, oldest first
    order: BTreeMap<u64, CacheKey>,
    /// Key -> its current stamp
    stamps: HashMap<CacheKey, u64>,
    next_seq: u64,
}

impl LruTracker {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, tracking it if new.
    pub fn touch(&mut self, key: &CacheKey) {
        let seq = self.next_seq;
        self.next_seq += 1;

        match self.stamps.get_mut(key) {
            Some(stamp) => {
                self.order.remove(stamp);
                *stamp = seq;
            }
            None => {
                self.stamps.insert(key.clone(), seq);
            }
        }
        self.order.insert(seq, key.clone());
    }

    // == Remove ==
    /// Stops tracking a key. Unknown keys are ignored.
    pub fn remove(&mut self, key: &CacheKey) {
        if let Some(seq) = self.stamps.remove(key) {
            self.order.remove(&seq);
        }
    }

    // == Evict Oldest ==
    /// Returns and stops tracking the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<CacheKey> {
        let (_, key) = self.order.pop_first()?;
        self.stamps.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&CacheKey> {
        self.order.values().next()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}
