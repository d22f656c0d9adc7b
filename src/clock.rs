//! Microsecond-resolution timestamp source for the profiling hot path.
//!
//! The facility treats its clock as a capability: the default is a monotonic
//! clock anchored at construction, but embedders (and tests) may supply
//! their own source. Timestamps are raw microsecond counts; only ordering
//! and deltas matter, never the epoch.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A monotonic microsecond timestamp source.
///
/// Implementations must be cheap and callable from contexts that cannot
/// sleep; `now_micros` sits on the profile enter/exit path of every
/// instrumented call site.
pub trait Clock: Send + Sync {
    /// Current timestamp in microseconds since an arbitrary epoch.
    fn now_micros(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }
}

/// Default clock: `std::time::Instant` anchored at construction.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }
}

/// A hand-driven clock for deterministic timing in tests and simulations.
#[derive(Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            micros: AtomicU64::new(start),
        }
    }

    /// Set the absolute time.
    pub fn set(&self, micros: u64) {
        self.micros.store(micros, Ordering::Release);
    }

    /// Advance the clock by `delta` microseconds.
    pub fn advance(&self, delta: u64) {
        self.micros.fetch_add(delta, Ordering::Release);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::Acquire)
    }
}
