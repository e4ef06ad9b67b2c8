//! Cooperative shutdown signal shared by the worker threads

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cloneable shutdown flag. Triggering it wakes every thread sleeping on it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock() = true;
        condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep until `deadline`. Returns `false` if shutdown was requested first.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        let (flag, condvar) = &*self.inner;
        let mut triggered = flag.lock();
        while !*triggered {
            if condvar.wait_until(&mut triggered, deadline).timed_out() {
                return !*triggered;
            }
        }
        false
    }

    pub fn sleep(&self, duration: Duration) -> bool {
        self.sleep_until(Instant::now() + duration)
    }
}
