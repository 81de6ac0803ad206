//! Retry pacing for remote workers, and the token that interrupts it.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_common::EncoderConfig;

/// Grows by `step` on every consecutive failure up to `max`; a success resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteBackoff {
    step: Duration,
    max: Duration,
    current: Duration,
}

impl RemoteBackoff {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self {
            step,
            max,
            current: Duration::ZERO,
        }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(config.remote_backoff_step(), config.remote_backoff_max())
    }

    /// Record a failure; returns how long to sleep.
    pub fn failed(&mut self) -> Duration {
        self.current = (self.current + self.step).min(self.max);
        self.current
    }

    /// Record a success; returns true if we were backing off.
    pub fn succeeded(&mut self) -> bool {
        let was_backing_off = self.is_backing_off();
        self.current = Duration::ZERO;
        was_backing_off
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn is_backing_off(&self) -> bool {
        !self.current.is_zero()
    }
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cooperative cancellation for one worker thread.
///
/// Checked only at the worker's blocking points (waiting for a job, sleeping
/// off a backoff), never in the middle of handling a job.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let _guard = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `duration`. Returns false if cancelled before it elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.lock.lock();
        while !self.is_cancelled() {
            if self.inner.wake.wait_until(&mut guard, deadline).timed_out() {
                return !self.is_cancelled();
            }
        }
        false
    }
}
