//! High-throughput UDP packet engine
//!
//! Pooled receive buffers, a single-threaded batched event loop, lock-free
//! metrics, and a paced multi-threaded load generator.

pub mod core;
pub mod engine;
pub mod hot_path;
pub mod infrastructure;
pub mod loadgen;

// Re-export commonly used types
pub use engine::{Server, ServerHandle, ServerState};
pub use infrastructure::config::{Config, LoadTestSettings, LoggingConfig, ServerConfig};
pub use loadgen::{LoadTestClient, LoadTestConfig, LoadTestReport};

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Address resolution failed: {0}")]
    Resolve(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<infrastructure::config::ConfigError> for EngineError {
    fn from(e: infrastructure::config::ConfigError) -> Self {
        EngineError::Config(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;
