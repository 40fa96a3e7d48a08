/*!
 * Abort Semaphore
 *
 * A binary semaphore whose waiters can give up early. Every acquire carries a
 * predicate ("is my request still pending?"). A waiter parks only while the
 * semaphore is held and the predicate holds; when the holder releases, all
 * parked waiters re-check and those whose request was serviced in the
 * meantime abort instead of taking the semaphore.
 *
 * # Design
 *
 * Parking goes through `parking_lot_core`, keyed on the semaphore's own
 * address. The validate callback runs under the parking bucket lock, the same
 * lock `unpark_all` takes, so a release can never slip between the check and
 * the park.
 */

use parking_lot_core::{park, unpark_all, DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Result of competing for the combiner role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock
    Acquired,
    /// The caller's request was serviced by another holder; the lock is not held
    AlreadyServiced,
}

/// Binary semaphore with predicate-driven abort
#[repr(C, align(64))]
pub struct AbortSemaphore {
    held: AtomicBool,
    parked: AtomicUsize,
}

impl AbortSemaphore {
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
            parked: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Single non-blocking attempt
    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// Block until the semaphore is acquired or `pending` turns false
    pub fn acquire(&self, pending: impl Fn() -> bool) -> AcquireOutcome {
        loop {
            if !pending() {
                return AcquireOutcome::AlreadyServiced;
            }
            if self.try_acquire() {
                return AcquireOutcome::Acquired;
            }

            self.parked.fetch_add(1, Ordering::SeqCst);
            // Unparked or invalidated, the loop re-examines both conditions.
            unsafe {
                park(
                    self.key(),
                    || self.held.load(Ordering::SeqCst) && pending(),
                    || {},
                    |_, _| {},
                    DEFAULT_PARK_TOKEN,
                    None,
                );
            }
            self.parked.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Release the semaphore and wake every parked waiter
    ///
    /// All waiters wake so that each one can check whether the session that
    /// just ended serviced it.
    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) > 0 {
            unsafe {
                unpark_all(self.key(), DEFAULT_UNPARK_TOKEN);
            }
        }
    }

    /// Whether some thread holds the semaphore (advisory)
    #[inline]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    /// Approximate number of parked waiters (for diagnostics)
    #[inline]
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}

impl Default for AbortSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_uncontended_acquire() {
        let sem = AbortSemaphore::new();
        assert_eq!(sem.acquire(|| true), AcquireOutcome::Acquired);
        assert!(sem.is_held());
        sem.release();
        assert!(!sem.is_held());
    }

    #[test]
    fn test_abort_when_not_pending() {
        let sem = AbortSemaphore::new();
        assert!(sem.try_acquire());
        assert_eq!(sem.acquire(|| false), AcquireOutcome::AlreadyServiced);
        sem.release();
    }

    #[test]
    fn test_waiter_aborts_on_release() {
        let sem = Arc::new(AbortSemaphore::new());
        let serviced = Arc::new(AtomicBool::new(false));
        assert!(sem.try_acquire());

        let waiter = {
            let sem = sem.clone();
            let serviced = serviced.clone();
            thread::spawn(move || sem.acquire(|| !serviced.load(Ordering::SeqCst)))
        };

        thread::sleep(Duration::from_millis(50));
        serviced.store(true, Ordering::SeqCst);
        sem.release();

        assert_eq!(waiter.join().unwrap(), AcquireOutcome::AlreadyServiced);
    }

    #[test]
    fn test_waiter_acquires_on_release() {
        let sem = Arc::new(AbortSemaphore::new());
        assert!(sem.try_acquire());

        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let outcome = sem.acquire(|| true);
                sem.release();
                (outcome, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        sem.release();

        let (outcome, elapsed) = waiter.join().unwrap();
        assert_eq!(outcome, AcquireOutcome::Acquired);
        assert!(elapsed >= Duration::from_millis(40));
    }

    #[test]
    fn test_mutual_exclusion() {
        let sem = Arc::new(AbortSemaphore::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sem = sem.clone();
                let inside = inside.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        assert_eq!(sem.acquire(|| true), AcquireOutcome::Acquired);
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        sem.release();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
