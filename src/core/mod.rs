//! Core types shared by the server and the load generator
//!
//! - Buffer: fixed-capacity datagram storage
//! - DatagramUnit / OutboundDatagram: one received / queued datagram
//! - ServiceCommand: parsed wire command
//! - clock: wall-clock and monotonic time sources

pub mod buffer;
pub mod clock;
pub mod command;
pub mod datagram;

pub use buffer::Buffer;
pub use clock::{epoch_millis, MonotonicClock};
pub use command::{CommandError, ServiceCommand};
pub use datagram::{DatagramUnit, OutboundDatagram};
