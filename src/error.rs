//! Error types for the query cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Boxed error produced by caller-supplied compute, persist and sink code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache-aside compute callback failed; nothing was cached
    #[error(transparent)]
    Compute(BoxError),

    /// The write-through persist callback failed; the cache is unchanged
    #[error(transparent)]
    Persist(BoxError),

    /// The write-behind buffer is full
    #[error("Write-behind buffer full ({capacity} pending writes)")]
    Backpressure { capacity: usize },

    /// The value could not be serialized for size accounting
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No write-behind sink is configured, or the controller is shut down
    #[error("Write-behind persistence unavailable")]
    WriteBehindUnavailable,

    /// Rejected configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key not present (or expired)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    pub fn compute(err: impl Into<BoxError>) -> Self {
        Self::Compute(err.into())
    }

    pub fn persist(err: impl Into<BoxError>) -> Self {
        Self::Persist(err.into())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Backpressure { .. } | CacheError::WriteBehindUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::Compute(_) | CacheError::Persist(_) => StatusCode::BAD_GATEWAY,
            CacheError::Serialization(_) | CacheError::InvalidConfig(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
