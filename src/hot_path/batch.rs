//! Batched receive and send
//!
//! One loop iteration drains at most `max_batch` datagrams from the socket
//! and sends at most `max_batch` queued responses, so a backlog on either
//! side cannot starve the other.

use crate::core::{DatagramUnit, OutboundDatagram};
use crate::hot_path::socket::{DatagramSocket, TryRecv};
use crate::infrastructure::metrics::PerformanceMetrics;
use crate::infrastructure::pool::BufferPool;
use std::collections::VecDeque;
use std::io;

/// Receive up to `max_batch` datagrams into `batch`
///
/// Stops at the first attempt that yields no data. On a socket error the
/// buffer of the failed attempt is released, datagrams already received stay
/// in `batch`, and the error is returned.
///
/// Returns the number of datagrams appended.
pub fn receive_batch<S: DatagramSocket>(
    socket: &S,
    pool: &BufferPool,
    batch: &mut Vec<DatagramUnit>,
    max_batch: usize,
) -> io::Result<usize> {
    let start_len = batch.len();

    while batch.len() - start_len < max_batch {
        let mut buffer = pool.acquire();
        match socket.try_recv(buffer.storage_mut()) {
            TryRecv::Datagram { len, source } => {
                buffer.set_len(len);
                batch.push(DatagramUnit::new(source, buffer));
            }
            TryRecv::Timeout => {
                pool.release(buffer);
                break;
            }
            TryRecv::Error(e) => {
                pool.release(buffer);
                return Err(e);
            }
        }
    }

    Ok(batch.len() - start_len)
}

/// Send up to `max_batch` queued responses
///
/// A failed send drops that response, ends the flush for this iteration and
/// leaves the rest of the queue for the next one.
///
/// Returns the number of datagrams sent, or the send error.
pub fn flush_send_queue<S: DatagramSocket>(
    socket: &S,
    queue: &mut VecDeque<OutboundDatagram>,
    metrics: &PerformanceMetrics,
    max_batch: usize,
) -> io::Result<usize> {
    let mut sent = 0;

    while sent < max_batch {
        let Some(datagram) = queue.pop_front() else {
            break;
        };
        socket.send_to(&datagram.payload, datagram.destination)?;
        metrics.record_packet_sent(datagram.payload.len());
        sent += 1;
    }

    Ok(sent)
}


#[cfg(test)]
mod tests {
    use super::mock::MockSocket;
    use super::*;
    use bytes::Bytes;
    use std::net::SocketAddr;

    fn client() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_batch_never_exceeds_limit() {
        let socket = MockSocket::new();
        for i in 0..120 {
            socket.push(format!("ECHO {}", i).as_bytes(), client());
        }
        let pool = BufferPool::new(64, 10, 200);
        let mut batch = Vec::new();

        assert_eq!(receive_batch(&socket, &pool, &mut batch, 50).unwrap(), 50);
        assert_eq!(batch.len(), 50);
        assert_eq!(batch[0].payload(), b"ECHO 0");
        assert_eq!(batch[49].payload(), b"ECHO 49");
        assert_eq!(socket.inbound.lock().unwrap().len(), 70);
    }

    #[test]
    fn test_batch_stops_when_socket_empty() {
        let socket = MockSocket::new();
        socket.push(b"PING", client());
        socket.push(b"TIME", client());
        let pool = BufferPool::new(64, 4, 4);
        let mut batch = Vec::new();

        assert_eq!(receive_batch(&socket, &pool, &mut batch, 50).unwrap(), 2);
        // The buffer used by the timed-out attempt went back to the pool
        assert_eq!(pool.available(), 2);
        assert_eq!(batch[1].source(), client());
    }

    #[test]
    fn test_batch_error_keeps_received_and_releases_buffer() {
        let socket = MockSocket::new();
        socket.push(b"PING", client());
        socket.push(b"PING", client());
        *socket.recv_error_after.lock().unwrap() = Some(1);
        let pool = BufferPool::new(64, 4, 4);
        let mut batch = Vec::new();

        assert!(receive_batch(&socket, &pool, &mut batch, 50).is_err());
        assert_eq!(batch.len(), 1);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_flush_is_bounded_and_fifo() {
        let socket = MockSocket::new();
        let metrics = PerformanceMetrics::new();
        let mut queue: VecDeque<_> = (0..5)
            .map(|i| OutboundDatagram::new(client(), Bytes::from(format!("R{}", i))))
            .collect();

        assert_eq!(flush_send_queue(&socket, &mut queue, &metrics, 3).unwrap(), 3);
        assert_eq!(queue.len(), 2);
        assert_eq!(metrics.packets_sent(), 3);

        let sent = socket.sent();
        assert_eq!(sent[0].0, b"R0");
        assert_eq!(sent[2].0, b"R2");

        assert_eq!(flush_send_queue(&socket, &mut queue, &metrics, 3).unwrap(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_error_leaves_remaining() {
        let socket = MockSocket::new();
        *socket.failing_sends.lock().unwrap() = 1;
        let metrics = PerformanceMetrics::new();
        let mut queue: VecDeque<_> = (0..3)
            .map(|i| OutboundDatagram::new(client(), Bytes::from(format!("R{}", i))))
            .collect();

        assert!(flush_send_queue(&socket, &mut queue, &metrics, 50).is_err());
        assert_eq!(queue.len(), 2);
        assert_eq!(metrics.packets_sent(), 0);

        assert_eq!(flush_send_queue(&socket, &mut queue, &metrics, 50).unwrap(), 2);
        assert_eq!(socket.sent()[0].0, b"R1");
    }
}
