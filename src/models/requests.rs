//! Request DTOs for the cache admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

/// Maximum accepted query text length in bytes
pub const MAX_QUERY_LENGTH: usize = 4096;

/// Request body for PUT /entries
///
/// # Fields
/// - `query`: Query template the value is a result of
/// - `params`: Ordered query parameters
/// - `value`: The result to cache
/// - `ttl`: Optional TTL in seconds (uses default if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct PutEntryRequest {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl PutEntryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_query(&self.query)
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_secs)
    }
}

/// Request body for POST /lookup
#[derive(Debug, Clone, Deserialize)]
pub struct LookupRequest {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl LookupRequest {
    pub fn validate(&self) -> Option<String> {
        validate_query(&self.query)
    }
}

fn validate_query(query: &str) -> Option<String> {
    if query.trim().is_empty() {
        return Some("Query cannot be empty".to_string());
    }
    if query.len() > MAX_QUERY_LENGTH {
        return Some(format!(
            "Query exceeds maximum length of {} bytes",
            MAX_QUERY_LENGTH
        ));
    }
    None
}

/// Renders JSON parameters the way a Rust caller would pass them.
///
/// Strings lose their JSON quotes so `"sales"` and `&"sales"` derive the
/// same key; every other value uses its compact JSON form.
pub fn param_texts(params: &[Value]) -> Vec<String> {
    params
        .iter()
        .map(|param| match param {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_request_deserialize() {
        let json = r#"{"query": "SELECT * FROM users WHERE id = $1", "params": [7], "value": {"name": "ada"}}"#;
        let req: PutEntryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.params, vec![json!(7)]);
        assert_eq!(req.value["name"], "ada");
        assert!(req.ttl().is_none());
    }

    #[test]
    fn test_put_request_with_ttl() {
        let json = r#"{"query": "SELECT 1", "value": 1, "ttl": 60}"#;
        let req: PutEntryRequest = serde_json::from_str(json).unwrap();
        assert!(req.params.is_empty());
        assert_eq!(req.ttl(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_validate_empty_query() {
        let req = LookupRequest {
            query: "   ".to_string(),
            params: vec![],
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_long_query() {
        let req = LookupRequest {
            query: "x".repeat(MAX_QUERY_LENGTH + 1),
            params: vec![],
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_param_texts() {
        let texts = param_texts(&[json!("sales"), json!(3), json!(true), json!(null)]);
        assert_eq!(texts, vec!["sales", "3", "true", "null"]);
    }
}
