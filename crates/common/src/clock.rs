//! Injectable clock
//!
//! Queue items and matches are ordered by creation time, so tests need
//! full control over timestamps. Production code uses [`SystemClock`];
//! tests use [`FixedClock`], which advances by a fixed step on every read
//! so consecutive insertions get distinct, reproducible timestamps.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current time in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests
///
/// Starts at a fixed instant and steps forward by `step_ms` on every call,
/// so repeated runs observe identical timestamp sequences.
pub struct FixedClock {
    current: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl FixedClock {
    /// Create a clock starting at `start`, advancing 1ms per read
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_step(start, 1)
    }

    /// Create a clock with an explicit step in milliseconds
    pub fn with_step(start: DateTime<Utc>, step_ms: i64) -> Self {
        Self {
            current: Mutex::new(start),
            step: Duration::milliseconds(step_ms),
        }
    }

    /// Create a clock starting at the UNIX epoch
    pub fn epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock().expect("clock lock poisoned");
        let now = *current;
        *current += self.step;
        now
    }
}
