//! API Handlers
//!
//! HTTP request handlers for the cache admin endpoints.

use std::fmt::Display;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{CacheController, CacheKey, Param};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::models::requests::param_texts;
use crate::models::{
    HealthResponse, InvalidateResponse, LookupRequest, LookupResponse, PutEntryRequest,
    PutEntryResponse, StatsResponse,
};
use crate::tasks::WriteBehindSink;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cache of JSON query results
    pub cache: CacheController<Value>,
}

impl AppState {
    pub fn new(cache: CacheController<Value>) -> Self {
        Self { cache }
    }

    /// Starts a controller from `config` with write-behind through `sink`.
    pub fn from_config(config: CacheConfig, sink: std::sync::Arc<dyn WriteBehindSink<Value>>) -> Result<Self> {
        let cache = CacheController::builder(config).write_behind(sink).build()?;
        Ok(Self::new(cache))
    }
}

fn param_refs(texts: &[String]) -> Vec<Param<'_>> {
    texts.iter().map(|text| text as &(dyn Display + Sync)).collect()
}

/// Handler for PUT /entries
///
/// Caches a query result immediately and queues it for write-behind
/// persistence.
pub async fn put_entry_handler(
    State(state): State<AppState>,
    Json(req): Json<PutEntryRequest>,
) -> Result<Json<PutEntryResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl();
    let texts = param_texts(&req.params);
    let key = state
        .cache
        .put_async(&req.query, &param_refs(&texts), req.value, ttl)
        .await?;

    Ok(Json(PutEntryResponse::new(&key)))
}

/// Handler for POST /lookup
///
/// Returns the cached result for a query without computing anything.
pub async fn lookup_handler(
    State(state): State<AppState>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<LookupResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let texts = param_texts(&req.params);
    let key = crate::cache::derive_key(&req.query, &param_refs(&texts));
    let value = state
        .cache
        .lookup_key(&key)
        .await
        .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

    Ok(Json(LookupResponse::new(&key, value)))
}

/// Handler for DELETE /entries/:key
///
/// Invalidates an entry by its derived key.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let key = CacheKey::from_hex(&key)
        .ok_or_else(|| CacheError::InvalidRequest(format!("Malformed cache key: {}", key)))?;

    if !state.cache.invalidate_key(&key).await {
        return Err(CacheError::NotFound(key.to_string()));
    }

    Ok(Json(InvalidateResponse::new(&key)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TracingSink;
    use serde_json::json;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::from_config(CacheConfig::default(), Arc::new(TracingSink)).unwrap()
    }

    fn put_request(value: Value) -> PutEntryRequest {
        PutEntryRequest {
            query: "SELECT * FROM orders WHERE customer_id = $1".to_string(),
            params: vec![json!("CUST123")],
            value,
            ttl: None,
        }
    }

    #[tokio::test]
    async fn test_put_and_lookup_handler() {
        let state = state();

        let put = put_entry_handler(State(state.clone()), Json(put_request(json!({"status": "PENDING"}))))
            .await
            .unwrap();

        let lookup = LookupRequest {
            query: "SELECT * FROM orders WHERE customer_id = $1".to_string(),
            params: vec![json!("CUST123")],
        };
        let found = lookup_handler(State(state.clone()), Json(lookup)).await.unwrap();

        assert_eq!(found.key, put.key);
        assert_eq!(found.value["status"], "PENDING");

        state.cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_string_params_match_rust_callers() {
        let state = state();
        put_entry_handler(State(state.clone()), Json(put_request(json!(1)))).await.unwrap();

        let value = state
            .cache
            .lookup("SELECT * FROM orders WHERE customer_id = $1", &[&"CUST123"])
            .await;
        assert_eq!(value, Some(json!(1)));

        state.cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_lookup_missing() {
        let state = state();
        let req = LookupRequest {
            query: "SELECT 1".to_string(),
            params: vec![],
        };

        let result = lookup_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalidate_handler() {
        let state = state();
        let put = put_entry_handler(State(state.clone()), Json(put_request(json!(1))))
            .await
            .unwrap();

        let result = invalidate_handler(State(state.clone()), Path(put.key.clone())).await;
        assert!(result.is_ok());

        let again = invalidate_handler(State(state.clone()), Path(put.key.clone())).await;
        assert!(matches!(again, Err(CacheError::NotFound(_))));

        state.cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalidate_malformed_key() {
        let result = invalidate_handler(State(state()), Path("not-a-key".to_string())).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_put_after_shutdown_is_unavailable() {
        let state = state();
        state.cache.shutdown().await;

        let result = put_entry_handler(State(state), Json(put_request(json!(1)))).await;
        assert!(matches!(result, Err(CacheError::WriteBehindUnavailable)));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let response = stats_handler(State(state())).await;
        assert_eq!(response.stats.hits, 0);
        assert_eq!(response.stats.misses, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
