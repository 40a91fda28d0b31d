//! Infrastructure - cold path only
//!
//! This module contains non-latency-critical code:
//! - Configuration and logging
//! - Buffer pool and metrics shared with the event loop
//! - Periodic stats reporting and the HTTP stats API

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod reporter;

pub use metrics::{MetricsSnapshot, PerformanceMetrics};
pub use pool::{BufferPool, PoolStats};
