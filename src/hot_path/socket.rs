//! Datagram socket seam
//!
//! The event loop is generic over `DatagramSocket` so the batch logic can
//! be driven by an in-memory socket in tests. Receive attempts report an
//! explicit outcome instead of surfacing timeouts as errors.

use std::io;
use std::net::{SocketAddr, UdpSocket};

/// Outcome of one receive attempt
#[derive(Debug)]
pub enum TryRecv {
    /// A datagram of `len` bytes was written into the buffer
    Datagram { len: usize, source: SocketAddr },
    /// No data within the receive timeout
    Timeout,
    /// Socket-level failure
    Error(io::Error),
}

/// Minimal datagram socket interface used by the event loop
pub trait DatagramSocket: Send {
    /// Receive at most one datagram into `buf`, waiting no longer than the
    /// socket's receive timeout
    fn try_recv(&self, buf: &mut [u8]) -> TryRecv;

    /// Send one datagram
    fn send_to(&self, payload: &[u8], destination: SocketAddr) -> io::Result<usize>;

    /// Bound local address
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramSocket for UdpSocket {
    #[inline]
    fn try_recv(&self, buf: &mut [u8]) -> TryRecv {
        match self.recv_from(buf) {
            Ok((len, source)) => TryRecv::Datagram { len, source },
            Err(e) if is_timeout(&e) => TryRecv::Timeout,
            Err(e) => TryRecv::Error(e),
        }
    }

    #[inline]
    fn send_to(&self, payload: &[u8], destination: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, payload, destination)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Whether an I/O error means "nothing arrived in time"
///
/// Unix reports an expired receive timeout as `WouldBlock`, Windows as
/// `TimedOut`.
#[inline]
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_udp_timeout_is_reported_as_timeout() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(1)))
            .unwrap();

        let mut buf = [0u8; 64];
        assert!(matches!(socket.try_recv(&mut buf), TryRecv::Timeout));
    }

    #[test]
    fn test_udp_datagram_received() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(b"PING", receiver.local_addr().unwrap())
            .unwrap();

        let mut buf = [0u8; 64];
        match receiver.try_recv(&mut buf) {
            TryRecv::Datagram { len, source } => {
                assert_eq!(&buf[..len], b"PING");
                assert_eq!(source, sender.local_addr().unwrap());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
