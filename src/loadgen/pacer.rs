//! Precision send pacing
//!
//! Sends are scheduled on an absolute timeline (`start + k * interval`), so
//! a late wake-up shortens the next wait instead of drifting the rate.
//! Waiting uses `spin_sleep`: native sleep for the bulk of the wait, then a
//! short spin to land on the deadline despite coarse OS timers.

use spin_sleep::SpinSleeper;
use std::time::{Duration, Instant};

/// Absolute-schedule rate limiter for one sender
pub struct Pacer {
    interval: Duration,
    next: Instant,
    sleeper: SpinSleeper,
}

impl Pacer {
    /// First send is due at `start`
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next: start,
            sleeper: SpinSleeper::default(),
        }
    }

    /// Per-sender interval for an aggregate rate split over `senders`
    ///
    /// Equivalent to `1e9 / (total_pps / senders)` nanoseconds, computed
    /// without truncating the per-sender rate.
    pub fn interval_for(total_pps: u64, senders: usize) -> Option<Duration> {
        if total_pps == 0 || senders == 0 {
            return None;
        }
        let nanos = 1_000_000_000u128 * senders as u128 / total_pps as u128;
        Some(Duration::from_nanos(nanos.min(u64::MAX as u128) as u64))
    }

    /// Park until the next scheduled send time, then advance the schedule
    ///
    /// Returns the scheduled time of the send being released.
    pub fn wait(&mut self) -> Instant {
        let now = Instant::now();
        if now < self.next {
            self.sleeper.sleep(self.next - now);
        }
        let scheduled = self.next;
        self.next += self.interval;
        scheduled
    }

    /// Time the next send is due
    #[inline]
    pub fn next_due(&self) -> Instant {
        self.next
    }
}
