//! Cache Entry Module
//!
//! Defines the structure for individual cached query results with TTL and
//! access metadata.

use std::time::Duration;

use serde::Serialize;

use crate::cache::CacheKey;
use crate::error::Result;

// == Cache Entry ==
/// A cached value together with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Derived key, never changes after creation
    pub key: CacheKey,
    /// The cached result
    pub value: V,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Last hit (or creation) timestamp (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Number of hits served by this entry
    pub access_count: u64,
    /// Length of the JSON serialization of `value`
    pub size_bytes: usize,
}

impl<V: Serialize> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry at `now_ms` living for `ttl`.
    ///
    /// Fails when `value` cannot be serialized for size accounting.
    pub fn new(key: CacheKey, value: V, now_ms: u64, ttl: Duration) -> Result<Self> {
        let size_bytes = measure(&value)?;
        Ok(Self::with_size(key, value, now_ms, ttl, size_bytes))
    }
}

impl<V> CacheEntry<V> {
    /// Creates an entry with a precomputed size.
    pub fn with_size(key: CacheKey, value: V, now_ms: u64, ttl: Duration, size_bytes: usize) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        Self {
            key,
            value,
            created_at: now_ms,
            expires_at: now_ms.saturating_add(ttl_ms),
            last_accessed_at: now_ms,
            access_count: 0,
            size_bytes,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry is expired at `now_ms`.
    ///
    /// An entry is expired once `now_ms >= expires_at`, so a zero TTL is
    /// expired immediately.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    // == Touch ==
    /// Records a hit at `now_ms`.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_accessed_at = now_ms;
        self.access_count += 1;
    }
}

// == Utility Functions ==
/// Returns the serialized size of `value` in bytes.
pub fn measure<V: Serialize>(value: &V) -> Result<usize> {
    Ok(serde_json::to_vec(value)?.len())
}
