//! Buffer pooling for zero-allocation receive path
//!
//! Pre-allocated fixed-size datagram buffers.
//! Uses crossbeam-queue for lock-free acquire/release.

use crate::core::Buffer;
use crossbeam_queue::ArrayQueue;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Bounded pool of fixed-size buffers
///
/// Never blocks and never fails: when the ceiling is reached `acquire`
/// hands out a transient buffer that `release` will later drop.
///
/// # Example
/// ```
/// use udp_engine::infrastructure::pool::BufferPool;
///
/// let pool = BufferPool::new(1400, 16, 32);
///
/// // Acquire from pool (no allocation)
/// let mut buf = pool.acquire();
/// buf.storage_mut()[0] = 42;
/// buf.set_len(1);
///
/// // Release back to pool (no drop)
/// pool.release(buf);
/// assert_eq!(pool.available(), 16);
/// ```
pub struct BufferPool {
    available: ArrayQueue<Buffer>,
    id: NonZeroU64,
    buffer_size: usize,
    max_buffers: usize,
    /// Pooled buffers allocated so far (resident + in flight)
    total: AtomicUsize,
    acquisitions: AtomicU64,
    releases: AtomicU64,
    transient: AtomicU64,
    rejected: AtomicU64,
}

/// Occupancy snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub buffer_size: usize,
    pub max_buffers: usize,
    pub total: usize,
    pub available: usize,
    pub in_flight: usize,
    pub acquisitions: u64,
    pub releases: u64,
    pub transient_allocations: u64,
    pub rejected_releases: u64,
}

impl BufferPool {
    /// Create a pool and pre-allocate `initial` buffers
    ///
    /// # Arguments
    /// * `buffer_size` - Size of every pooled buffer in bytes
    /// * `initial` - Buffers allocated up front (clamped to `max_buffers`)
    /// * `max_buffers` - Pool ceiling
    pub fn new(buffer_size: usize, initial: usize, max_buffers: usize) -> Self {
        let max_buffers = max_buffers.max(1);
        let id = NonZeroU64::new(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
            .unwrap_or(NonZeroU64::MIN);
        let available = ArrayQueue::new(max_buffers);

        // Pre-populate the pool
        let mut total = 0;
        for _ in 0..initial.min(max_buffers) {
            if available.push(Buffer::pooled(buffer_size, id)).is_err() {
                break; // Queue is full
            }
            total += 1;
        }

        Self {
            available,
            id,
            buffer_size,
            max_buffers,
            total: AtomicUsize::new(total),
            acquisitions: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            transient: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Acquire an empty buffer
    ///
    /// Order of preference: a resident buffer, a newly allocated pooled
    /// buffer (while under the ceiling), a transient buffer.
    ///
    /// # Performance
    /// O(1) and lock-free. Allocates only while the pool is growing or
    /// exhausted.
    #[inline]
    pub fn acquire(&self) -> Buffer {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);

        if let Some(buffer) = self.available.pop() {
            return buffer;
        }

        // Reserve a slot under the ceiling before allocating
        let reserved = self
            .total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_buffers).then_some(n + 1)
            })
            .is_ok();

        if reserved {
            Buffer::pooled(self.buffer_size, self.id)
        } else {
            self.transient.fetch_add(1, Ordering::Relaxed);
            Buffer::transient(self.buffer_size)
        }
    }

    /// Return a buffer to the pool
    ///
    /// Foreign, transient, or wrong-size buffers are dropped.
    #[inline]
    pub fn release(&self, mut buffer: Buffer) {
        if buffer.origin() != Some(self.id) || buffer.capacity() != self.buffer_size {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }

        buffer.clear();
        self.releases.fetch_add(1, Ordering::Relaxed);

        if self.available.push(buffer).is_err() {
            // Unreachable while total <= capacity; keep the books straight anyway
            self.total.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Number of resident buffers
    #[inline]
    pub fn available(&self) -> usize {
        self.available.len()
    }

    /// Number of pooled buffers allocated (resident + in flight)
    #[inline]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Pool ceiling
    #[inline]
    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }

    /// Size of every pooled buffer
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Occupancy snapshot
    pub fn stats(&self) -> PoolStats {
        let total = self.total();
        let available = self.available();
        PoolStats {
            buffer_size: self.buffer_size,
            max_buffers: self.max_buffers,
            total,
            available,
            in_flight: total.saturating_sub(available),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            transient_allocations: self.transient.load(Ordering::Relaxed),
            rejected_releases: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} available (max {}, transient {})",
            self.available, self.total, self.max_buffers, self.transient_allocations
        )
    }
}
