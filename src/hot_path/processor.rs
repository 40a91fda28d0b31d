//! Command processor
//!
//! Turns one datagram payload into one response payload. Responses are
//! formatted into a reusable `BytesMut` and split off as `Bytes`, so the
//! send queue owns them independently of the receive buffer.

use crate::core::{epoch_millis, CommandError, ServiceCommand};
use crate::infrastructure::config::ServerConfig;
use crate::infrastructure::metrics::PerformanceMetrics;
use bytes::{Bytes, BytesMut};
use std::fmt::Write;
use std::sync::Arc;

/// Initial capacity of the response scratch buffer
const SCRATCH_CAPACITY: usize = 16 * 1024;

/// Per-datagram processing failures
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to format response")]
    Format(#[from] std::fmt::Error),
}

/// Parses payloads and produces responses
pub struct CommandProcessor {
    metrics: Arc<PerformanceMetrics>,
    scratch: BytesMut,
    default_load_iterations: u64,
    max_load_iterations: u64,
}

impl CommandProcessor {
    pub fn new(metrics: Arc<PerformanceMetrics>, config: &ServerConfig) -> Self {
        Self {
            metrics,
            scratch: BytesMut::with_capacity(SCRATCH_CAPACITY),
            default_load_iterations: config.default_load_iterations,
            max_load_iterations: config.max_load_iterations,
        }
    }

    /// Process one payload and return the response bytes
    ///
    /// # Errors
    /// Fails only if the response cannot be formatted. Protocol-level
    /// problems (unknown command, bad argument) produce an `ERROR ...`
    /// response.
    pub fn process(&mut self, payload: &[u8]) -> Result<Bytes, ProcessError> {
        // Invalid sequences become U+FFFD; valid text is borrowed as-is
        let message = String::from_utf8_lossy(payload);

        match ServiceCommand::parse(&message) {
            Ok(command) => self.dispatch(command)?,
            Err(CommandError::InvalidLoadParameter) => {
                self.scratch.write_str("ERROR invalid load parameter")?
            }
        }

        Ok(self.scratch.split().freeze())
    }

    fn dispatch(&mut self, command: ServiceCommand<'_>) -> Result<(), ProcessError> {
        let out = &mut self.scratch;
        match command {
            ServiceCommand::Ping => write!(out, "PONG {}", epoch_millis())?,
            ServiceCommand::Echo(Some(text)) => write!(out, "ECHO: {}", text)?,
            ServiceCommand::Echo(None) => out.write_str("ECHO: (empty)")?,
            ServiceCommand::Time => write!(out, "TIME {}", epoch_millis())?,
            ServiceCommand::Stats => write!(
                out,
                "STATS pkt_rx={} pkt_tx={} throughput={:.2}_MBps",
                self.metrics.packets_received(),
                self.metrics.packets_sent(),
                self.metrics.throughput_mbps(),
            )?,
            ServiceCommand::Load(iterations) => {
                let iterations = iterations.unwrap_or(self.default_load_iterations);
                if iterations > self.max_load_iterations {
                    out.write_str("ERROR invalid load parameter")?
                } else {
                    write!(out, "LOAD {}", load_digest(iterations))?
                }
            }
            ServiceCommand::Quit => out.write_str("BYE")?,
            ServiceCommand::Unknown(token) => {
                out.write_str("ERROR unknown command: ")?;
                for c in token.chars() {
                    out.write_char(c.to_ascii_uppercase())?;
                }
            }
        }
        Ok(())
    }
}

/// Deterministic CPU-bound workload behind `LOAD`
///
/// Accumulates `sqrt(i) * sin(i)` truncating to an integer at every step.
/// Same input, same digest.
pub fn load_digest(iterations: u64) -> i64 {
    let mut result: i64 = 0;
    for i in 0..iterations {
        let x = i as f64;
        result = (result as f64 + x.sqrt() * x.sin()) as i64;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> CommandProcessor {
        CommandProcessor::new(Arc::new(PerformanceMetrics::new()), &ServerConfig::default())
    }

    fn respond(p: &mut CommandProcessor, payload: &str) -> String {
        let bytes = p.process(payload.as_bytes()).unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn trailing_int(response: &str, prefix: &str) -> u64 {
        response
            .strip_prefix(prefix)
            .and_then(|rest| rest.parse().ok())
            .unwrap_or_else(|| panic!("unexpected response {:?}", response))
    }

    #[test]
    fn test_echo() {
        let mut p = processor();
        assert_eq!(respond(&mut p, "ECHO hello"), "ECHO: hello");
        assert_eq!(respond(&mut p, "ECHO hello  world\n"), "ECHO: hello  world");
        assert_eq!(respond(&mut p, "ECHO"), "ECHO: (empty)");
    }

    #[test]
    fn test_ping_is_monotonic() {
        let mut p = processor();
        let first = trailing_int(&respond(&mut p, "PING"), "PONG ");
        let second = trailing_int(&respond(&mut p, "PING"), "PONG ");
        assert!(second >= first);
    }

    #[test]
    fn test_time() {
        let mut p = processor();
        let before = epoch_millis();
        let t = trailing_int(&respond(&mut p, "TIME"), "TIME ");
        assert!(t >= before);
    }

    #[test]
    fn test_load_is_deterministic() {
        let mut p = processor();
        let a = respond(&mut p, "LOAD 1000");
        let b = respond(&mut p, "LOAD 1000");
        assert_eq!(a, b);
        assert_eq!(a, format!("LOAD {}", load_digest(1000)));
    }

    #[test]
    fn test_load_default_and_invalid() {
        let mut p = processor();
        assert_eq!(respond(&mut p, "LOAD"), format!("LOAD {}", load_digest(1000)));
        assert_eq!(respond(&mut p, "LOAD abc"), "ERROR invalid load parameter");
        assert_eq!(respond(&mut p, "LOAD 99999999999"), "ERROR invalid load parameter");
        assert_eq!(respond(&mut p, "LOAD 0"), "LOAD 0");
    }

    #[test]
    fn test_quit_and_unknown() {
        let mut p = processor();
        assert_eq!(respond(&mut p, "QUIT"), "BYE");
        assert_eq!(respond(&mut p, "FOOBAR"), "ERROR unknown command: FOOBAR");
        assert_eq!(respond(&mut p, "foobar x"), "ERROR unknown command: FOOBAR");
        assert_eq!(respond(&mut p, ""), "ERROR unknown command: ");
    }

    #[test]
    fn test_stats_reflects_counters() {
        let metrics = Arc::new(PerformanceMetrics::new());
        metrics.record_packet_received(10);
        metrics.record_packet_received(10);
        metrics.record_packet_sent(5);
        let mut p = CommandProcessor::new(metrics, &ServerConfig::default());

        assert_eq!(
            respond(&mut p, "STATS"),
            "STATS pkt_rx=2 pkt_tx=1 throughput=0.00_MBps"
        );
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let mut p = processor();
        let echo = p.process(b"ECHO caf\xe9").unwrap();
        assert_eq!(&echo[..], "ECHO: caf\u{FFFD}".as_bytes());

        let unknown = p.process(&[0xff, 0xfe]).unwrap();
        assert_eq!(
            &unknown[..],
            "ERROR unknown command: \u{FFFD}\u{FFFD}".as_bytes()
        );
        assert_eq!(respond(&mut p, "QUIT"), "BYE");
    }

    #[test]
    fn test_responses_are_independent() {
        let mut p = processor();
        let a = p.process(b"ECHO a").unwrap();
        let b = p.process(b"ECHO b").unwrap();
        assert_eq!(&a[..], b"ECHO: a");
        assert_eq!(&b[..], b"ECHO: b");
    }
}
