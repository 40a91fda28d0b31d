//! Periodic stats reporter
//!
//! Background thread that logs a metrics and pool snapshot every interval.
//! Read-only: it never mutates shared state. Dropping the stop sender (or
//! calling `shutdown`) wakes it immediately.

use crate::infrastructure::metrics::PerformanceMetrics;
use crate::infrastructure::pool::BufferPool;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to the running reporter thread
pub struct Reporter {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Reporter {
    /// Spawn the reporter thread
    pub fn spawn(
        interval: Duration,
        metrics: Arc<PerformanceMetrics>,
        pool: Arc<BufferPool>,
    ) -> io::Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("stats-reporter".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => report(&metrics, &pool),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self { stop_tx, handle })
    }

    /// Stop the thread and wait for it
    pub fn shutdown(self) {
        let _ = self.stop_tx.try_send(());
        drop(self.stop_tx);
        if self.handle.join().is_err() {
            tracing::warn!(target: "server", "stats reporter panicked");
        }
    }
}

/// Log one stats report
pub fn report(metrics: &PerformanceMetrics, pool: &BufferPool) {
    let snapshot = metrics.snapshot();
    let pool_stats = pool.stats();
    tracing::info!(
        target: "server",
        packets_rx = snapshot.packets_received,
        packets_tx = snapshot.packets_sent,
        errors = snapshot.errors,
        pool_available = pool_stats.available,
        pool_total = pool_stats.total,
        "stats: {} | buffer pool {}",
        snapshot,
        pool_stats
    );
}
