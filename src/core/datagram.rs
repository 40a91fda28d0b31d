//! Inbound and outbound datagrams

use super::Buffer;
use bytes::Bytes;
use std::net::SocketAddr;

/// A received datagram and the buffer holding its payload
///
/// Lives for one loop iteration: created on receive, consumed once the
/// response has been staged.
#[derive(Debug)]
pub struct DatagramUnit {
    source: SocketAddr,
    buffer: Buffer,
}

impl DatagramUnit {
    #[inline]
    pub fn new(source: SocketAddr, buffer: Buffer) -> Self {
        Self { source, buffer }
    }

    /// Sender address (ip + port)
    #[inline(always)]
    pub fn source(&self) -> SocketAddr {
        self.source
    }

    /// Payload length in bytes
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Payload bytes
    #[inline(always)]
    pub fn payload(&self) -> &[u8] {
        self.buffer.filled()
    }

    /// Give the buffer back (for release to the pool)
    #[inline]
    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }
}

/// A response waiting in the send queue
///
/// Owns its payload, so it is independent of the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundDatagram {
    pub destination: SocketAddr,
    pub payload: Bytes,
}

impl OutboundDatagram {
    #[inline]
    pub fn new(destination: SocketAddr, payload: Bytes) -> Self {
        Self {
            destination,
            payload,
        }
    }
}
