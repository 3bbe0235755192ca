//! Clock sources for phase timing.
//!
//! Phase durations are measured on a monotonic clock so they never go
//! negative when the wall clock is adjusted.

use std::cell::Cell;
use std::sync::OnceLock;
use std::time::Instant;

pub trait Timing {
    /// Seconds since an arbitrary fixed origin. Never decreases.
    fn time(&self) -> f64;
}

/// [`Instant`]-backed clock.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Process-wide clock shared by every run.
    pub fn global() -> &'static MonotonicClock {
        static CLOCK: OnceLock<MonotonicClock> = OnceLock::new();
        CLOCK.get_or_init(MonotonicClock::new)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Timing for MonotonicClock {
    fn time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Deterministic clock: every reading advances by a fixed step.
#[derive(Debug)]
pub struct MockTiming {
    now: Cell<f64>,
    step: f64,
}

impl MockTiming {
    pub fn new(start: f64, step: f64) -> Self {
        Self {
            now: Cell::new(start),
            step,
        }
    }
}

impl Timing for MockTiming {
    fn time(&self) -> f64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}
