//! Wall-clock abstraction.
//!
//! TTL computation and the sweep both read "now". Production code uses
//! [`SystemClock`]; tests use [`ManualClock`] to advance time without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        crate::current_timestamp_millis()
    }
}

/// Manually driven clock for tests.
///
/// # Example
///
/// ```rust
/// use graph_lifecycle::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(250);
/// assert_eq!(clock.now_millis(), 1_250);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `now` milliseconds.
    #[must_use]
    pub const fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Creates a clock frozen at the current system time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(crate::current_timestamp_millis())
    }

    /// Moves the clock forward (or backward, for negative values).
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
