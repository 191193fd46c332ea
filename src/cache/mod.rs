//! Cache Module
//!
//! In-process query result cache with TTL expiration, LRU eviction under a
//! byte budget, and cache-aside / write-through / write-behind access.

mod clock;
mod controller;
mod entry;
mod eviction;
mod key;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use controller::{CacheController, CacheControllerBuilder};
pub use entry::{measure, CacheEntry};
pub use eviction::{enforce_capacity, sweep_expired};
pub use key::{derive_key, CacheKey, Param};
pub use lru::LruTracker;
pub use stats::{CacheStats, StatsRecorder};
pub use store::{Entries, StorageMap};

pub(crate) use controller::CacheCore;
