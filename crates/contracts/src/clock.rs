//! Clock abstraction
//!
//! Hold timers and file ages are compared against `Clock::now()` on every
//! evaluation instead of sleeping, so they can be driven by a `ManualClock`.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync {
    /// Monotonic time, used for elapsed-time comparisons
    fn now(&self) -> Instant;

    /// Local wall-clock time, used for file names
    fn wall_clock(&self) -> DateTime<Local>;
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<(Instant, DateTime<Local>)>,
}

impl ManualClock {
    /// Start at the current system time
    pub fn new() -> Self {
        Self {
            inner: Mutex::new((Instant::now(), Local::now())),
        }
    }

    /// Move both clocks forward
    pub fn advance(&self, by: Duration) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.0 += by;
        guard.1 += ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
    }

    /// Move forward by whole seconds
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn wall_clock(&self) -> DateTime<Local> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).1
    }
}
