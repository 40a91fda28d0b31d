//! Multi-threaded UDP load generator
//!
//! Each worker owns its socket, waits at a shared start gate, then sends
//! paced `PING <send_time_ns>` datagrams until its deadline. After every
//! send it waits (bounded) for one response: a response adds a round-trip
//! sample, a timeout counts as a lost packet. Nothing is retried.

use crate::core::MonotonicClock;
use crate::hot_path::socket::is_timeout;
use crate::infrastructure::config::LoadTestSettings;
use crate::loadgen::pacer::Pacer;
use crate::{log_loadgen, EngineError, Result};
use crossbeam::channel::{self, Receiver};
use serde::Serialize;
use std::fmt::{self, Write};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::Level;

/// Load test parameters
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    pub host: String,
    pub port: u16,
    pub threads: usize,
    /// Aggregate target rate across all workers
    pub packets_per_second: u64,
    pub duration: Duration,
    pub response_timeout: Duration,
    pub response_buffer_size: usize,
}

impl LoadTestConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        threads: usize,
        packets_per_second: u64,
        duration: Duration,
    ) -> Self {
        let defaults = LoadTestSettings::default();
        Self {
            host: host.into(),
            port,
            threads,
            packets_per_second,
            duration,
            response_timeout: Duration::from_millis(defaults.response_timeout_ms),
            response_buffer_size: defaults.response_buffer_size,
        }
    }

    /// Apply timeout and buffer settings from the config file
    pub fn with_settings(mut self, settings: &LoadTestSettings) -> Self {
        self.response_timeout = Duration::from_millis(settings.response_timeout_ms);
        self.response_buffer_size = settings.response_buffer_size;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(EngineError::InvalidArgument("threads must be > 0".into()));
        }
        if self.packets_per_second == 0 {
            return Err(EngineError::InvalidArgument(
                "packets per second must be > 0".into(),
            ));
        }
        if self.duration.is_zero() {
            return Err(EngineError::InvalidArgument("duration must be > 0".into()));
        }
        if self.response_timeout.is_zero() {
            return Err(EngineError::InvalidArgument(
                "response timeout must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Aggregate counters shared by all workers
#[derive(Debug, Default)]
struct SharedCounters {
    sent: AtomicU64,
    received: AtomicU64,
    rtt_total_ns: AtomicU64,
    rtt_max_ns: AtomicU64,
}

impl SharedCounters {
    #[inline]
    fn record_response(&self, rtt_ns: u64) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.rtt_total_ns.fetch_add(rtt_ns, Ordering::Relaxed);
        self.rtt_max_ns.fetch_max(rtt_ns, Ordering::Relaxed);
    }
}

/// Load test results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadTestReport {
    pub sent: u64,
    pub received: u64,
    pub lost: u64,
    pub loss_rate_percent: f64,
    pub mean_rtt_ms: Option<f64>,
    pub max_rtt_ms: Option<f64>,
    pub elapsed: Duration,
    pub achieved_pps: f64,
    pub worker_failures: usize,
}

impl LoadTestReport {
    fn from_counters(counters: &SharedCounters, elapsed: Duration, worker_failures: usize) -> Self {
        let sent = counters.sent.load(Ordering::Relaxed);
        let received = counters.received.load(Ordering::Relaxed);
        let lost = sent.saturating_sub(received);
        let loss_rate_percent = if sent > 0 {
            lost as f64 * 100.0 / sent as f64
        } else {
            0.0
        };

        let (mean_rtt_ms, max_rtt_ms) = if received > 0 {
            let total = counters.rtt_total_ns.load(Ordering::Relaxed) as f64;
            let max = counters.rtt_max_ns.load(Ordering::Relaxed) as f64;
            (Some(total / received as f64 / 1e6), Some(max / 1e6))
        } else {
            (None, None)
        };

        let secs = elapsed.as_secs_f64();
        Self {
            sent,
            received,
            lost,
            loss_rate_percent,
            mean_rtt_ms,
            max_rtt_ms,
            elapsed,
            achieved_pps: if secs > 0.0 { sent as f64 / secs } else { 0.0 },
            worker_failures,
        }
    }
}

impl fmt::Display for LoadTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Load test completed in {:.2}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "  Packets sent:     {} ({:.0} pps)", self.sent, self.achieved_pps)?;
        writeln!(f, "  Packets received: {}", self.received)?;
        writeln!(f, "  Packet loss:      {:.2}%", self.loss_rate_percent)?;
        match (self.mean_rtt_ms, self.max_rtt_ms) {
            (Some(mean), Some(max)) => {
                write!(f, "  Round trip:       mean {:.3} ms, max {:.3} ms", mean, max)?
            }
            _ => write!(f, "  Round trip:       n/a")?,
        }
        if self.worker_failures > 0 {
            write!(f, "\n  Worker failures:  {}", self.worker_failures)?;
        }
        Ok(())
    }
}

/// Load generator
pub struct LoadTestClient {
    config: LoadTestConfig,
}

impl LoadTestClient {
    /// # Errors
    /// `EngineError::InvalidArgument` for zero threads, rate, duration or timeout.
    pub fn new(config: LoadTestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run the test on the calling thread's behalf and block until done
    pub fn run(&self) -> Result<LoadTestReport> {
        let config = &self.config;
        let target = resolve(&config.host, config.port)?;
        let interval = Pacer::interval_for(config.packets_per_second, config.threads)
            .ok_or_else(|| EngineError::InvalidArgument("invalid rate".into()))?;

        // Sockets are created up front so a failure aborts before any send
        let sockets = (0..config.threads)
            .map(|_| open_worker_socket(target, config.response_timeout))
            .collect::<io::Result<Vec<_>>>()?;

        log_loadgen!(
            Level::INFO,
            "load test: target={} threads={} rate={} pps duration={:?} interval={:?}",
            target,
            config.threads,
            config.packets_per_second,
            config.duration,
            interval
        );

        let counters = SharedCounters::default();
        let abort = AtomicBool::new(false);
        let clock = MonotonicClock::new();
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        let started = Instant::now();

        let (outcomes, spawn_error) = thread::scope(|scope| {
            let counters = &counters;
            let abort = &abort;
            let clock = &clock;
            let mut handles = Vec::with_capacity(config.threads);
            let mut spawn_error = None;

            for (id, socket) in sockets.into_iter().enumerate() {
                let worker = Worker {
                    id,
                    socket,
                    target,
                    interval,
                    duration: config.duration,
                    response_buffer_size: config.response_buffer_size,
                };
                let gate = gate_rx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("loadgen-{}", id))
                    .spawn_scoped(scope, move || worker.run(gate, abort, counters, clock));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        abort.store(true, Ordering::Release);
                        spawn_error = Some(e);
                        break;
                    }
                }
            }

            // Closing the gate releases every worker at once
            drop(gate_tx);

            let outcomes: Vec<io::Result<u64>> = handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "worker panicked")))
                })
                .collect();
            (outcomes, spawn_error)
        });

        if let Some(e) = spawn_error {
            return Err(EngineError::Io(e));
        }

        let mut worker_failures = 0;
        for (id, outcome) in outcomes.iter().enumerate() {
            if let Err(e) = outcome {
                worker_failures += 1;
                log_loadgen!(Level::WARN, "worker {} stopped early: {}", id, e);
            }
        }

        let report = LoadTestReport::from_counters(&counters, started.elapsed(), worker_failures);
        log_loadgen!(
            Level::INFO,
            "load test finished: sent={} received={} loss={:.2}%",
            report.sent,
            report.received,
            report.loss_rate_percent
        );
        Ok(report)
    }
}

/// One sender thread's state
struct Worker {
    id: usize,
    socket: UdpSocket,
    target: SocketAddr,
    interval: Duration,
    duration: Duration,
    response_buffer_size: usize,
}

impl Worker {
    /// Returns the number of datagrams this worker sent
    fn run(
        self,
        gate: Receiver<()>,
        abort: &AtomicBool,
        counters: &SharedCounters,
        clock: &MonotonicClock,
    ) -> io::Result<u64> {
        // Blocks until the sender side of the gate is dropped
        let _ = gate.recv();
        if abort.load(Ordering::Acquire) {
            return Ok(0);
        }

        let start = Instant::now();
        let deadline = start + self.duration;
        let mut pacer = Pacer::new(self.interval, start);
        let mut message = String::with_capacity(32);
        let mut response = vec![0u8; self.response_buffer_size];
        let mut sent = 0u64;

        // Sends scheduled at or after the deadline are never made
        while pacer.next_due() < deadline && Instant::now() < deadline {
            pacer.wait();

            let send_ns = clock.now_nanos();
            message.clear();
            let _ = write!(message, "PING {}", send_ns);

            match self.socket.send_to(message.as_bytes(), self.target) {
                Ok(_) => {}
                // ICMP feedback from an earlier datagram; this one never left
                Err(e) if is_unreachable(&e) => continue,
                Err(e) => return Err(e),
            }
            counters.sent.fetch_add(1, Ordering::Relaxed);
            sent += 1;

            match self.socket.recv_from(&mut response) {
                Ok(_) => counters.record_response(clock.now_nanos().saturating_sub(send_ns)),
                // Lost: no retry
                Err(e) if is_timeout(&e) || is_unreachable(&e) => {}
                Err(e) => return Err(e),
            }
        }

        log_loadgen!(Level::DEBUG, "worker {} done, sent {}", self.id, sent);
        Ok(sent)
    }
}

#[inline]
fn is_unreachable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

/// Resolve `host:port` to the first address
fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| EngineError::Resolve(format!("{}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| EngineError::Resolve(format!("{}:{}: no addresses", host, port)))
}

fn open_worker_socket(target: SocketAddr, response_timeout: Duration) -> io::Result<UdpSocket> {
    let local = if target.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = UdpSocket::bind(local)?;
    socket.set_read_timeout(Some(response_timeout))?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Server;
    use crate::infrastructure::config::ServerConfig;

    #[test]
    fn test_rejects_invalid_config() {
        let zero_threads = LoadTestConfig::new("127.0.0.1", 9, 0, 100, Duration::from_secs(1));
        assert!(matches!(
            LoadTestClient::new(zero_threads),
            Err(EngineError::InvalidArgument(_))
        ));

        let zero_rate = LoadTestConfig::new("127.0.0.1", 9, 1, 0, Duration::from_secs(1));
        assert!(LoadTestClient::new(zero_rate).is_err());

        let zero_duration = LoadTestConfig::new("127.0.0.1", 9, 1, 10, Duration::ZERO);
        assert!(LoadTestClient::new(zero_duration).is_err());
    }

    #[test]
    fn test_resolve() {
        let addr = resolve("127.0.0.1", 8888).unwrap();
        assert_eq!(addr, "127.0.0.1:8888".parse().unwrap());
        assert!(matches!(
            resolve("no such host.invalid", 1),
            Err(EngineError::Resolve(_))
        ));
    }

    #[test]
    fn test_report_math() {
        let counters = SharedCounters::default();
        counters.sent.store(10, Ordering::Relaxed);
        counters.record_response(2_000_000);
        counters.record_response(4_000_000);

        let report = LoadTestReport::from_counters(&counters, Duration::from_secs(2), 0);
        assert_eq!(report.lost, 8);
        assert!((report.loss_rate_percent - 80.0).abs() < 1e-9);
        assert_eq!(report.mean_rtt_ms, Some(3.0));
        assert_eq!(report.max_rtt_ms, Some(4.0));
        assert!((report.achieved_pps - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_without_traffic() {
        let report = LoadTestReport::from_counters(&SharedCounters::default(), Duration::ZERO, 1);
        assert_eq!(report.loss_rate_percent, 0.0);
        assert_eq!(report.mean_rtt_ms, None);
        assert!(report.to_string().contains("n/a"));
    }

    #[test]
    fn test_timeouts_count_as_lost() {
        // Bound but silent peer
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();

        let config = LoadTestConfig::new("127.0.0.1", port, 1, 100, Duration::from_millis(300))
            .with_response_timeout(Duration::from_millis(20));
        let report = LoadTestClient::new(config).unwrap().run().unwrap();

        assert!(report.sent > 0);
        assert_eq!(report.received, 0);
        assert_eq!(report.lost, report.sent);
        assert_eq!(report.loss_rate_percent, 100.0);
        assert_eq!(report.worker_failures, 0);
    }

    fn live_server() -> (crate::engine::ServerHandle, thread::JoinHandle<Result<crate::infrastructure::MetricsSnapshot>>) {
        let config = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            stats_interval_ms: 60_000,
            ..ServerConfig::default()
        };
        let server = Server::bind(config, 0).unwrap();
        let handle = server.handle();
        (handle, thread::spawn(move || server.run()))
    }

    #[test]
    fn test_no_send_after_deadline() {
        let (handle, server_thread) = live_server();
        let port = handle.local_addr().port();

        // One send per worker per second: only the send at t=0 fits in 1s
        let load = LoadTestConfig::new("127.0.0.1", port, 4, 4, Duration::from_secs(1))
            .with_response_timeout(Duration::from_millis(500));
        let report = LoadTestClient::new(load).unwrap().run().unwrap();

        handle.stop();
        server_thread.join().unwrap().unwrap();

        assert_eq!(report.sent, 4);
        assert!(report.elapsed < Duration::from_millis(1500));
    }

    #[test]
    fn test_pacing_against_live_server() {
        let (handle, server_thread) = live_server();
        let port = handle.local_addr().port();

        let duration = Duration::from_secs(2);
        let load = LoadTestConfig::new("127.0.0.1", port, 4, 1000, duration)
            .with_response_timeout(Duration::from_millis(500));
        let report = LoadTestClient::new(load).unwrap().run().unwrap();

        handle.stop();
        server_thread.join().unwrap().unwrap();

        let expected = 2000.0;
        let sent = report.sent as f64;
        assert!(
            (sent - expected).abs() <= expected * 0.05,
            "sent {} not within 5% of {}",
            report.sent,
            expected
        );
        assert!(report.received > 0);
        assert!(report.mean_rtt_ms.is_some());
        assert!(handle.snapshot().packets_received >= report.received);
    }
}
