//! API Module
//!
//! HTTP handlers and routing for the cache admin API.
//!
//! # Endpoints
//! - `PUT /entries` - Cache a query result and queue it for persistence
//! - `POST /lookup` - Read a cached query result
//! - `DELETE /entries/:key` - Invalidate an entry by derived key
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
