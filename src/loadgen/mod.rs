//! Load generation - paced UDP senders
//!
//! Worker threads split an aggregate packet rate and measure round trips
//! against a running server.

pub mod client;
pub mod pacer;

pub use client::{LoadTestClient, LoadTestConfig, LoadTestReport};
pub use pacer::Pacer;
