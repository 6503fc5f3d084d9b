//! Time sources for measuring batches.

use std::time::{Duration, Instant};

/// Types for reading the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Returns the time elapsed between `start` and `end`,
    /// or zero if `end` precedes `start`.
    fn elapsed(&self, start: Instant, end: Instant) -> Duration {
        end.saturating_duration_since(start)
    }
}

/// Implementation of `Clock` based on `std::time::Instant`.
#[derive(Copy, Clone, Default, Debug)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
