//! Injectable time source.
//!
//! Reconciliation policy decisions are pure functions of object age, so the
//! current instant must be substitutable for deterministic testing.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> SystemTime;
}

/// The wall clock. Production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A manually-advanced clock for tests.
///
/// Starts at the instant given to [`ManualClock::new`] and only moves when
/// told to. Clones share nothing; share via `Arc` instead.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Creates a clock frozen at the Unix epoch plus `secs` seconds.
    #[must_use]
    pub fn at_epoch_secs(secs: u64) -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Moves the clock forward by `delta`.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += delta;
    }

    /// Sets the clock to an absolute instant.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn set(&self, instant: SystemTime) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::at_epoch_secs(100);
        let before = clock.now();
        clock.advance(Duration::from_secs(42));
        let after = clock.now();
        assert_eq!(after.duration_since(before).unwrap(), Duration::from_secs(42));
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::at_epoch_secs(0);
        let target = SystemTime::UNIX_EPOCH + Duration::from_secs(7);
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
