//! Hot path operations - per-datagram code
//!
//! This module contains latency-critical code:
//! - Socket seam with explicit receive outcomes
//! - Batched receive and bounded send flush
//! - Command parsing and dispatch

pub mod batch;
pub mod processor;
pub mod socket;

pub use batch::{flush_send_queue, receive_batch};
pub use processor::{load_digest, CommandProcessor, ProcessError};
pub use socket::{DatagramSocket, TryRecv};
