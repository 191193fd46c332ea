//! Background Tasks Module
//!
//! Tasks spawned by a cache controller for its lifetime.
//!
//! # Tasks
//! - Maintenance: sweeps expired entries at the configured interval
//! - Write-behind: batches buffered writes into a persistence sink

mod maintenance;
mod write_behind;

pub(crate) use maintenance::spawn_maintenance_task;
pub(crate) use write_behind::spawn_flush_worker;
pub use write_behind::{PendingWrite, TracingSink, WriteBehindSink};
