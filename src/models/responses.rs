//! Response DTOs for the cache admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheKey, CacheStats};

/// Response body for PUT /entries
#[derive(Debug, Clone, Serialize)]
pub struct PutEntryResponse {
    /// Success message
    pub message: String,
    /// Derived key of the stored entry
    pub key: String,
}

impl PutEntryResponse {
    pub fn new(key: &CacheKey) -> Self {
        Self {
            message: format!("Entry '{}' cached, persistence queued", key),
            key: key.to_string(),
        }
    }
}

/// Response body for POST /lookup
#[derive(Debug, Clone, Serialize)]
pub struct LookupResponse {
    pub key: String,
    pub value: Value,
}

impl LookupResponse {
    pub fn new(key: &CacheKey, value: Value) -> Self {
        Self {
            key: key.to_string(),
            value,
        }
    }
}

/// Response body for DELETE /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    pub key: String,
}

impl InvalidateResponse {
    pub fn new(key: &CacheKey) -> Self {
        Self {
            message: format!("Entry '{}' invalidated", key),
            key: key.to_string(),
        }
    }
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
