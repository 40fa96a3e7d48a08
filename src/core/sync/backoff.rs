/*!
 * Exponential Backoff
 *
 * Waiting helpers for threads that are not the combiner:
 *
 * 1. **Spin phase** (steps 0..SPIN_LIMIT): `2^step` `spin_loop()` hints
 * 2. **Yield phase** (later steps): `yield_now()` per step
 *
 * Plus a calibrated busy delay used by the heartbeat's bounded wait, which
 * needs sub-microsecond pauses that `thread::sleep` cannot deliver.
 */

use crate::core::limits::SPIN_LIMIT;
use std::thread;
use std::time::{Duration, Instant};

/// Step-counting backoff for spin loops
#[derive(Debug)]
pub struct SpinBackoff {
    step: u32,
    limit: u32,
}

impl SpinBackoff {
    /// Create a backoff that reports completion after `limit` steps
    #[inline]
    pub fn new(limit: u32) -> Self {
        Self { step: 0, limit }
    }

    /// Back off once, spinning first and yielding once spinning stops paying
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                std::hint::spin_loop();
            }
        } else {
            thread::yield_now();
        }

        if self.step < self.limit {
            self.step += 1;
        }
    }

    /// Whether the configured number of steps has been taken
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step >= self.limit
    }

    /// Start over from the spin phase
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

/// Busy-wait for roughly `duration` without descheduling the thread
#[inline]
pub fn delay(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_completes() {
        let mut backoff = SpinBackoff::new(3);
        assert!(!backoff.is_completed());
        for _ in 0..3 {
            backoff.snooze();
        }
        assert!(backoff.is_completed());

        backoff.reset();
        assert!(!backoff.is_completed());
    }

    #[test]
    fn test_backoff_saturates_in_yield_phase() {
        let mut backoff = SpinBackoff::new(SPIN_LIMIT + 4);
        for _ in 0..(SPIN_LIMIT + 20) {
            backoff.snooze();
        }
        assert!(backoff.is_completed());
    }

    #[test]
    fn test_delay_waits_at_least_duration() {
        let start = Instant::now();
        delay(Duration::from_micros(200));
        assert!(start.elapsed() >= Duration::from_micros(200));
    }
}
