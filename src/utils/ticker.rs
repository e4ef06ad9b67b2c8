//! Fixed-rate ticker driving the estimation cycle

use crate::utils::shutdown::Shutdown;
use std::time::{Duration, Instant};

/// Fires at a fixed period. Ticks that cannot be honoured because the caller
/// overran are skipped rather than replayed in a burst.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Instant,
    missed: u64,
}

impl Ticker {
    /// The first call to [`Ticker::wait`] returns immediately.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now(),
            missed: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of ticks skipped because the previous cycle overran
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Block until the next tick. Returns `false` once shutdown is requested.
    pub fn wait(&mut self, shutdown: &Shutdown) -> bool {
        if !shutdown.sleep_until(self.next) {
            return false;
        }

        self.next += self.period;
        let now = Instant::now();
        if self.next <= now {
            let behind = now.duration_since(self.next);
            let skipped = behind.as_nanos() / self.period.as_nanos().max(1) + 1;
            self.missed += skipped as u64;
            self.next = now + self.period;
        }

        true
    }
}
