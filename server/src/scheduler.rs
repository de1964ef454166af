//! Fixed-rate gate for world snapshot broadcasts.

use std::time::{Duration, Instant};

/// Decides on each tick whether a broadcast is due.
///
/// Fires at most once per call. After a stall the missed intervals are
/// skipped rather than replayed, and the cadence stays on a fixed grid
/// so late ticks do not accumulate drift.
#[derive(Debug, Clone)]
pub struct BroadcastScheduler {
    interval: Duration,
    last_broadcast: Option<Instant>,
}

impl BroadcastScheduler {
    /// Scheduler firing `rate_hz` times per second. A non-positive or
    /// non-finite rate fires on every poll.
    pub fn new(rate_hz: f64) -> Self {
        let interval = if rate_hz > 0.0 {
            Duration::try_from_secs_f64(1.0 / rate_hz).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        Self::from_interval(interval)
    }

    pub fn from_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_broadcast: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_broadcast(&self) -> Option<Instant> {
        self.last_broadcast
    }

    /// Forgets the last broadcast so the next poll fires immediately.
    pub fn reset(&mut self) {
        self.last_broadcast = None;
    }

    /// Returns true when a broadcast should be sent at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_broadcast else {
            self.last_broadcast = Some(now);
            return true;
        };

        let elapsed = now.saturating_duration_since(last);
        if self.interval.is_zero() {
            self.last_broadcast = Some(now);
            return true;
        }
        if elapsed < self.interval {
            return false;
        }

        let whole = elapsed.as_nanos() / self.interval.as_nanos();
        let next = u32::try_from(whole)
            .ok()
            .and_then(|n| self.interval.checked_mul(n))
            .and_then(|advance| last.checked_add(advance))
            .unwrap_or(now);
        self.last_broadcast = Some(next);
        true
    }
}
