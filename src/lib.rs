//! Query Cache - an in-process cache for query results
//!
//! Size-bounded LRU storage with TTL expiration, background sweeping,
//! optional miss coalescing, and cache-aside, write-through and write-behind
//! access patterns. An axum admin router exposes stats and entry management.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{derive_key, CacheController, CacheKey, CacheStats, Param};
pub use config::CacheConfig;
pub use error::{BoxError, CacheError, Result};
pub use tasks::{PendingWrite, TracingSink, WriteBehindSink};
