//! Performance metrics for the packet engine
//!
//! Lock-free counters using atomic operations.
//! Written by the event loop, read by the reporter thread and the stats API.

use crossbeam_utils::CachePadded;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of latency histogram buckets
pub const LATENCY_BUCKETS: usize = 10;

/// Minimum window between two throughput recomputations
pub const THROUGHPUT_WINDOW: Duration = Duration::from_secs(1);

/// Histogram bucket for a latency
///
/// Bucket `i` holds latencies whose microsecond value has `i + 1` decimal
/// digits: `[10^i, 10^(i+1))` us, with sub-microsecond samples in bucket 0
/// and everything from `10^9` us up in the last bucket.
#[inline]
pub fn latency_bucket(latency: Duration) -> usize {
    let mut micros = latency.as_micros().max(1);
    let mut bucket = 0;
    while micros >= 10 && bucket < LATENCY_BUCKETS - 1 {
        micros /= 10;
        bucket += 1;
    }
    bucket
}

/// Exclusive upper edge of a bucket in microseconds (`None` for the last one)
#[inline]
pub fn bucket_upper_bound_us(bucket: usize) -> Option<u64> {
    (bucket < LATENCY_BUCKETS - 1).then(|| 10u64.pow(bucket as u32 + 1))
}

/// Engine metrics collector
///
/// Counters are independent atomics; readers see an eventually consistent
/// view, which is all a report needs.
pub struct PerformanceMetrics {
    packets_received: CachePadded<AtomicU64>,
    bytes_received: AtomicU64,
    packets_sent: CachePadded<AtomicU64>,
    bytes_sent: AtomicU64,
    errors: AtomicU64,

    latency_total_ns: AtomicU64,
    latency_samples: AtomicU64,
    latency_buckets: [AtomicU64; LATENCY_BUCKETS],

    /// Throughput window state, written only by `update_throughput`
    window_start_ns: AtomicU64,
    window_packets: AtomicU64,
    window_bytes: AtomicU64,
    /// f64 bits
    current_pps: AtomicU64,
    /// f64 bits
    current_mbps: AtomicU64,

    start_time: Instant,
}

/// Point-in-time copy of all metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub errors: u64,
    pub latency_total_ns: u64,
    pub latency_samples: u64,
    pub latency_buckets: [u64; LATENCY_BUCKETS],
    /// Packets per second over the last throughput window
    pub packets_per_second: f64,
    /// MiB per second over the last throughput window
    pub throughput_mbps: f64,
    pub uptime_seconds: u64,
}

impl PerformanceMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            packets_received: CachePadded::new(AtomicU64::new(0)),
            bytes_received: AtomicU64::new(0),
            packets_sent: CachePadded::new(AtomicU64::new(0)),
            bytes_sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_total_ns: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            window_start_ns: AtomicU64::new(0),
            window_packets: AtomicU64::new(0),
            window_bytes: AtomicU64::new(0),
            current_pps: AtomicU64::new(0f64.to_bits()),
            current_mbps: AtomicU64::new(0f64.to_bits()),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn record_packet_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_packet_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one processing latency sample
    #[inline]
    pub fn record_latency(&self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency_total_ns.fetch_add(nanos, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.latency_buckets[latency_bucket(latency)].fetch_add(1, Ordering::Relaxed);
    }

    /// Recompute windowed throughput
    ///
    /// No-op until at least one second has passed since the previous
    /// recomputation, so it can be called on every loop iteration.
    pub fn update_throughput(&self) {
        self.update_throughput_at(Instant::now());
    }

    fn update_throughput_at(&self, now: Instant) {
        let now_ns = now.saturating_duration_since(self.start_time).as_nanos() as u64;
        let window_start = self.window_start_ns.load(Ordering::Relaxed);
        let elapsed_ns = now_ns.saturating_sub(window_start);
        if elapsed_ns < THROUGHPUT_WINDOW.as_nanos() as u64 {
            return;
        }

        let packets = self.packets_received.load(Ordering::Relaxed);
        let bytes = self.bytes_received.load(Ordering::Relaxed);
        let delta_packets = packets.saturating_sub(self.window_packets.load(Ordering::Relaxed));
        let delta_bytes = bytes.saturating_sub(self.window_bytes.load(Ordering::Relaxed));

        let elapsed_secs = elapsed_ns as f64 / 1e9;
        let pps = delta_packets as f64 / elapsed_secs;
        let mbps = delta_bytes as f64 / (elapsed_secs * 1024.0 * 1024.0);

        self.current_pps.store(pps.to_bits(), Ordering::Relaxed);
        self.current_mbps.store(mbps.to_bits(), Ordering::Relaxed);
        self.window_packets.store(packets, Ordering::Relaxed);
        self.window_bytes.store(bytes, Ordering::Relaxed);
        self.window_start_ns.store(now_ns, Ordering::Relaxed);
    }

    #[inline]
    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Current windowed throughput in MiB/s
    #[inline]
    pub fn throughput_mbps(&self) -> f64 {
        f64::from_bits(self.current_mbps.load(Ordering::Relaxed))
    }

    /// Current windowed packet rate
    #[inline]
    pub fn packets_per_second(&self) -> f64 {
        f64::from_bits(self.current_pps.load(Ordering::Relaxed))
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received(),
            packets_sent: self.packets_sent(),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            errors: self.errors(),
            latency_total_ns: self.latency_total_ns.load(Ordering::Relaxed),
            latency_samples: self.latency_samples.load(Ordering::Relaxed),
            latency_buckets: std::array::from_fn(|i| {
                self.latency_buckets[i].load(Ordering::Relaxed)
            }),
            packets_per_second: self.packets_per_second(),
            throughput_mbps: self.throughput_mbps(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSnapshot {
    /// Mean processing latency in microseconds
    pub fn mean_latency_us(&self) -> Option<f64> {
        (self.latency_samples > 0)
            .then(|| self.latency_total_ns as f64 / self.latency_samples as f64 / 1000.0)
    }

    /// Upper bucket edge (us) below which `quantile` of samples fall
    ///
    /// Resolution is one decimal order of magnitude. `None` without samples
    /// or when the quantile lands in the open-ended last bucket.
    pub fn latency_quantile_us(&self, quantile: f64) -> Option<u64> {
        let total: u64 = self.latency_buckets.iter().sum();
        if total == 0 {
            return None;
        }
        let target = ((total as f64) * quantile.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (bucket, count) in self.latency_buckets.iter().enumerate() {
            seen += count;
            if seen >= target {
                return bucket_upper_bound_us(bucket);
            }
        }
        None
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packets rx={} ({:.0} pps) tx={} | throughput {:.2} MB/s | bytes rx={} tx={} | errors={}",
            self.packets_received,
            self.packets_per_second,
            self.packets_sent,
            self.throughput_mbps,
            format_bytes(self.bytes_received),
            format_bytes(self.bytes_sent),
            self.errors,
        )?;
        if let Some(mean) = self.mean_latency_us() {
            write!(f, " | latency mean={:.1}us", mean)?;
            if let Some(p50) = self.latency_quantile_us(0.50) {
                write!(f, " p50<{}us", p50)?;
            }
            if let Some(p99) = self.latency_quantile_us(0.99) {
                write!(f, " p99<{}us", p99)?;
            }
        }
        Ok(())
    }
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = PerformanceMetrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.packets_received, 0);
        assert_eq!(snapshot.packets_sent, 0);
        assert_eq!(snapshot.errors, 0);
        assert_eq!(snapshot.latency_buckets, [0; LATENCY_BUCKETS]);
        assert!(snapshot.mean_latency_us().is_none());
    }

    #[test]
    fn test_record_packets() {
        let metrics = PerformanceMetrics::new();

        metrics.record_packet_received(100);
        metrics.record_packet_received(50);
        metrics.record_packet_sent(20);
        metrics.record_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.packets_received, 2);
        assert_eq!(snapshot.bytes_received, 150);
        assert_eq!(snapshot.packets_sent, 1);
        assert_eq!(snapshot.bytes_sent, 20);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn test_latency_bucket_edges() {
        assert_eq!(latency_bucket(Duration::from_nanos(0)), 0);
        assert_eq!(latency_bucket(Duration::from_nanos(999)), 0);
        assert_eq!(latency_bucket(Duration::from_micros(9)), 0);
        assert_eq!(latency_bucket(Duration::from_micros(10)), 1);
        assert_eq!(latency_bucket(Duration::from_micros(99)), 1);
        assert_eq!(latency_bucket(Duration::from_micros(100)), 2);
        assert_eq!(latency_bucket(Duration::from_millis(1)), 3);
        assert_eq!(latency_bucket(Duration::from_secs(1)), 6);
        assert_eq!(latency_bucket(Duration::from_secs(10_000)), 9);
    }

    #[test]
    fn test_latency_bucket_is_monotonic() {
        let mut previous = 0;
        for exp in 0..40 {
            let bucket = latency_bucket(Duration::from_nanos(1u64 << exp));
            assert!(bucket >= previous);
            assert!(bucket < LATENCY_BUCKETS);
            previous = bucket;
        }
    }

    #[test]
    fn test_record_latency() {
        let metrics = PerformanceMetrics::new();
        metrics.record_latency(Duration::from_micros(5));
        metrics.record_latency(Duration::from_micros(15));
        metrics.record_latency(Duration::from_micros(40));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.latency_samples, 3);
        assert_eq!(snapshot.latency_total_ns, 60_000);
        assert_eq!(snapshot.latency_buckets[0], 1);
        assert_eq!(snapshot.latency_buckets[1], 2);
        assert_eq!(snapshot.mean_latency_us(), Some(20.0));
    }

    #[test]
    fn test_latency_quantiles() {
        let metrics = PerformanceMetrics::new();
        for _ in 0..98 {
            metrics.record_latency(Duration::from_micros(3));
        }
        metrics.record_latency(Duration::from_micros(500));
        metrics.record_latency(Duration::from_micros(500));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.latency_quantile_us(0.50), Some(10));
        assert_eq!(snapshot.latency_quantile_us(0.99), Some(1000));
    }

    #[test]
    fn test_throughput_noop_below_window() {
        let metrics = PerformanceMetrics::new();
        metrics.record_packet_received(1024);
        metrics.update_throughput_at(metrics.start_time + Duration::from_millis(500));
        assert_eq!(metrics.packets_per_second(), 0.0);
    }

    #[test]
    fn test_throughput_window() {
        let metrics = PerformanceMetrics::new();
        for _ in 0..2048 {
            metrics.record_packet_received(1024);
        }

        metrics.update_throughput_at(metrics.start_time + Duration::from_secs(2));
        assert!((metrics.packets_per_second() - 1024.0).abs() < 1e-6);
        assert!((metrics.throughput_mbps() - 1.0).abs() < 1e-6);

        // Nothing new in the next window
        metrics.update_throughput_at(metrics.start_time + Duration::from_secs(3));
        assert_eq!(metrics.packets_per_second(), 0.0);
    }

    #[test]
    fn test_concurrent_recording() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(PerformanceMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_packet_received(10);
                        metrics.record_latency(Duration::from_micros(1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.packets_received, 4000);
        assert_eq!(snapshot.bytes_received, 40_000);
        assert_eq!(snapshot.latency_buckets[0], 4000);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.0 GB");
    }

    #[test]
    fn test_snapshot_display() {
        let metrics = PerformanceMetrics::new();
        metrics.record_packet_received(10);
        metrics.record_latency(Duration::from_micros(2));
        let text = metrics.snapshot().to_string();
        assert!(text.contains("rx=1"));
        assert!(text.contains("latency mean=2.0us"));
    }
}
