//! Packet engine
//!
//! Single-threaded batched event loop:
//! receive batch -> process batch -> flush send queue -> update metrics.
//! The loop thread owns the socket, the batch and the send queue; only the
//! metrics and pool are shared (with the reporter thread and the stats API).

use crate::core::{DatagramUnit, OutboundDatagram};
use crate::hot_path::{flush_send_queue, receive_batch, CommandProcessor, DatagramSocket};
use crate::infrastructure::config::ServerConfig;
use crate::infrastructure::metrics::{MetricsSnapshot, PerformanceMetrics};
use crate::infrastructure::pool::{BufferPool, PoolStats};
use crate::infrastructure::reporter::{self, Reporter};
use crate::{log_server, EngineError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::Level;

/// Event loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum ServerState {
    Init = 0,
    Listening = 1,
    ReceiveBatch = 2,
    ProcessBatch = 3,
    FlushSendQueue = 4,
    UpdateMetrics = 5,
    Stopped = 6,
}

impl ServerState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::Listening,
            2 => Self::ReceiveBatch,
            3 => Self::ProcessBatch,
            4 => Self::FlushSendQueue,
            5 => Self::UpdateMetrics,
            _ => Self::Stopped,
        }
    }

    /// Whether the loop is inside an iteration
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::ReceiveBatch | Self::ProcessBatch | Self::FlushSendQueue | Self::UpdateMetrics
        )
    }
}

/// Cloneable control and observation handle
#[derive(Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    metrics: Arc<PerformanceMetrics>,
    pool: Arc<BufferPool>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// Request a stop
    ///
    /// The loop notices at its next iteration, at most one receive timeout
    /// later.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether a stop has not been requested yet
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> Arc<PerformanceMetrics> {
        self.metrics.clone()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

/// UDP packet server
pub struct Server<S: DatagramSocket = UdpSocket> {
    config: ServerConfig,
    socket: S,
    pool: Arc<BufferPool>,
    metrics: Arc<PerformanceMetrics>,
    processor: CommandProcessor,
    batch: Vec<DatagramUnit>,
    send_queue: VecDeque<OutboundDatagram>,
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    local_addr: SocketAddr,
}

impl Server<UdpSocket> {
    /// Bind a tuned UDP socket on `config.bind_address:port`
    ///
    /// # Errors
    /// `EngineError::Bind` when the socket cannot be created or bound.
    pub fn bind(config: ServerConfig, port: u16) -> Result<Self> {
        config.validate()?;

        let ip: IpAddr = config.bind_address.parse().map_err(|_| {
            EngineError::InvalidArgument(format!("invalid bind address {}", config.bind_address))
        })?;
        let addr = SocketAddr::new(ip, port);

        let socket = open_socket(addr, &config).map_err(|source| EngineError::Bind { addr, source })?;
        Self::with_socket(config, socket)
    }
}

/// Create, tune and bind the server socket
fn open_socket(addr: SocketAddr, config: &ServerConfig) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    // Large kernel buffers to reduce drops under bursts
    if let Err(e) = socket.set_recv_buffer_size(config.socket_buffer_bytes) {
        tracing::warn!(target: "server", "could not set receive buffer size: {}", e);
    }
    if let Err(e) = socket.set_send_buffer_size(config.socket_buffer_bytes) {
        tracing::warn!(target: "server", "could not set send buffer size: {}", e);
    }
    socket.bind(&addr.into())?;
    socket.set_read_timeout(Some(config.recv_timeout()))?;

    log_server!(
        Level::DEBUG,
        "socket buffers rx={:?} tx={:?}",
        socket.recv_buffer_size().ok(),
        socket.send_buffer_size().ok()
    );

    Ok(socket.into())
}

impl<S: DatagramSocket> Server<S> {
    /// Build a server around an already bound socket
    ///
    /// The socket's receive timeout bounds how long a receive attempt (and
    /// a stop request) can wait.
    pub fn with_socket(config: ServerConfig, socket: S) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(AtomicU8::new(ServerState::Init as u8));

        let local_addr = socket.local_addr()?;
        let pool = Arc::new(BufferPool::new(
            config.buffer_size,
            config.initial_pool_size,
            config.max_pool_size,
        ));
        let metrics = Arc::new(PerformanceMetrics::new());
        let processor = CommandProcessor::new(metrics.clone(), &config);

        let server = Self {
            batch: Vec::with_capacity(config.max_batch_size),
            send_queue: VecDeque::with_capacity(config.max_batch_size * 2),
            config,
            socket,
            pool,
            metrics,
            processor,
            running: Arc::new(AtomicBool::new(true)),
            state,
            local_addr,
        };
        server.set_state(ServerState::Listening);

        log_server!(
            Level::INFO,
            "listening on {} (buffer {} bytes, pool {}/{}, batch {})",
            server.local_addr,
            server.config.buffer_size,
            server.config.initial_pool_size,
            server.config.max_pool_size,
            server.config.max_batch_size
        );

        Ok(server)
    }

    /// Control handle, usable from other threads
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: self.running.clone(),
            state: self.state.clone(),
            metrics: self.metrics.clone(),
            pool: self.pool.clone(),
            local_addr: self.local_addr,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the event loop on the current thread until stopped
    ///
    /// Spawns the stats reporter for the duration of the loop. Returns the
    /// final metrics snapshot; the socket is closed when this returns.
    pub fn run(mut self) -> Result<MetricsSnapshot> {
        let reporter = Reporter::spawn(
            self.config.stats_interval(),
            self.metrics.clone(),
            self.pool.clone(),
        )?;

        log_server!(Level::INFO, "event loop started (single-threaded)");

        while self.running.load(Ordering::Acquire) {
            let received = self.run_iteration();
            if received == 0 {
                std::thread::yield_now();
            }
        }

        // Nothing may stay borrowed from the pool past the loop
        for unit in self.batch.drain(..) {
            self.pool.release(unit.into_buffer());
        }
        if !self.send_queue.is_empty() {
            log_server!(
                Level::DEBUG,
                "dropping {} unsent responses on stop",
                self.send_queue.len()
            );
            self.send_queue.clear();
        }

        self.set_state(ServerState::Stopped);
        reporter.shutdown();

        log_server!(Level::INFO, "server stopped, final stats:");
        reporter::report(&self.metrics, &self.pool);

        Ok(self.metrics.snapshot())
    }

    /// One receive/process/flush/update cycle
    ///
    /// Returns the number of datagrams received.
    fn run_iteration(&mut self) -> usize {
        self.set_state(ServerState::ReceiveBatch);
        let received = match receive_batch(
            &self.socket,
            &self.pool,
            &mut self.batch,
            self.config.max_batch_size,
        ) {
            Ok(n) => n,
            Err(e) => {
                // Socket failures are expected once a stop is in progress
                if self.running.load(Ordering::Acquire) {
                    self.metrics.record_error();
                    log_server!(Level::ERROR, "receive failed: {}", e);
                }
                self.batch.len()
            }
        };

        if !self.batch.is_empty() {
            self.set_state(ServerState::ProcessBatch);
            self.process_batch();
        }

        self.set_state(ServerState::FlushSendQueue);
        if let Err(e) = flush_send_queue(
            &self.socket,
            &mut self.send_queue,
            &self.metrics,
            self.config.max_batch_size,
        ) {
            self.metrics.record_error();
            log_server!(Level::WARN, "send failed: {}", e);
        }

        self.set_state(ServerState::UpdateMetrics);
        self.metrics.update_throughput();

        received
    }

    /// Process every datagram in the batch, in receive order
    fn process_batch(&mut self) {
        for unit in self.batch.drain(..) {
            let started = Instant::now();
            self.metrics.record_packet_received(unit.len());

            match self.processor.process(unit.payload()) {
                Ok(response) => self
                    .send_queue
                    .push_back(OutboundDatagram::new(unit.source(), response)),
                Err(e) => {
                    self.metrics.record_error();
                    log_server!(Level::WARN, "dropping datagram from {}: {}", unit.source(), e);
                }
            }

            self.pool.release(unit.into_buffer());
            self.metrics.record_latency(started.elapsed());
        }
    }

    #[inline(always)]
    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}
