//! Clock sources for invocation timestamps.
//!
//! Timestamps are fractional seconds since the Unix epoch so that logs written by
//! one process remain meaningful to another reading the same shared store.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    /// Seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// Wall clock backed by `chrono::Utc`.
///
/// Not monotonic. If the system clock steps backwards, a key's entries can be
/// recorded out of order; counting and garbage collection filter every entry by
/// age and do not rely on order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same time, so advancing one advances all of them.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<f64>>,
}

impl MockClock {
    /// Create a mock clock reading `start`.
    pub fn new(start: f64) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by `seconds`.
    pub fn advance(&self, seconds: f64) {
        *self.current.lock() += seconds;
    }

    /// Set the clock to `now`.
    pub fn set(&self, now: f64) {
        *self.current.lock() = now;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(1_700_000_000.0)
    }
}

impl Clock for MockClock {
    fn now(&self) -> f64 {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_system_clock() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = clock.now();

        assert!(t2 > t1);
        assert!(t1 > 1_600_000_000.0);
    }

    #[test]
    fn test_mock_clock() {
        let clock = MockClock::new(100.0);
        let shared = clock.clone();

        assert_eq!(clock.now(), 100.0);

        shared.advance(10.5);
        assert_eq!(clock.now(), 110.5);

        clock.set(5.0);
        assert_eq!(shared.now(), 5.0);
    }
}
