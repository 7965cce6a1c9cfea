//! Monotonic millisecond clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A clock reading fractional milliseconds since an arbitrary epoch.
///
/// Readings never decrease within a process. There are no calendar or
/// timezone semantics; the value is only meaningful relative to other
/// readings of the same clock.
pub trait MonotonicClock: Send + Sync {
    /// Milliseconds elapsed since the clock's epoch.
    fn now_millis(&self) -> f64;
}

/// Clock backed by [`Instant`], with its epoch at construction.
#[derive(Debug, Clone, Copy)]
pub struct InstantClock {
    origin: Instant,
}

impl InstantClock {
    /// Create a clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for InstantClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for InstantClock {
    fn now_millis(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock that only moves when told to.
///
/// Useful for embedding hosts that virtualize time and for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis_bits: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start_ms`.
    pub fn new(start_ms: f64) -> Self {
        Self {
            millis_bits: AtomicU64::new(start_ms.to_bits()),
        }
    }

    /// Move the clock forward. Negative or NaN deltas are ignored.
    pub fn advance(&self, delta_ms: f64) {
        if delta_ms.is_nan() || delta_ms <= 0.0 {
            return;
        }
        // fetch_update only fails when the closure returns None
        let _ = self
            .millis_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + delta_ms).to_bits())
            });
    }
}

impl MonotonicClock for ManualClock {
    fn now_millis(&self) -> f64 {
        f64::from_bits(self.millis_bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_clock_non_decreasing() {
        let clock = InstantClock::new();
        let mut previous = clock.now_millis();

        for _ in 0..10_000 {
            let now = clock.now_millis();
            assert!(now >= previous, "{now} < {previous}");
            previous = now;
        }
    }

    #[test]
    fn test_instant_clock_measures_sleep() {
        let clock = InstantClock::new();
        let before = clock.now_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let after = clock.now_millis();

        assert!(after - before >= 5.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(10.0);
        assert!((clock.now_millis() - 10.0).abs() < f64::EPSILON);

        clock.advance(2.5);
        assert!((clock.now_millis() - 12.5).abs() < f64::EPSILON);

        clock.advance(-100.0);
        clock.advance(f64::NAN);
        assert!((clock.now_millis() - 12.5).abs() < f64::EPSILON);
    }
}
