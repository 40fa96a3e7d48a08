/*!
 * Combiner Lock
 *
 * Elects exactly one combiner at a time and owns the structure state the
 * combiner mutates. The state is only reachable through a [`CombinerGuard`],
 * so node-mutating code cannot run without holding the combiner role.
 *
 * # Design: Enum Dispatch
 *
 * The two disciplines are selected once at construction and dispatched via
 * an enum rather than a trait object, keeping the acquire path inlinable.
 */

use super::abort::{AbortSemaphore, AcquireOutcome};
use super::backoff::SpinBackoff;
use super::config::LockDiscipline;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Test-and-test-and-set flag with serviced-check while spinning
struct SpinFlag {
    held: CachePadded<AtomicBool>,
    spin_limit: u32,
}

impl SpinFlag {
    fn new(spin_limit: u32) -> Self {
        Self {
            held: CachePadded::new(AtomicBool::new(false)),
            spin_limit,
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        !self.held.load(Ordering::Relaxed)
            && self
                .held
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    fn acquire(&self, pending: impl Fn() -> bool) -> AcquireOutcome {
        let mut backoff = SpinBackoff::new(self.spin_limit);
        loop {
            if self.try_acquire() {
                return AcquireOutcome::Acquired;
            }

            while self.held.load(Ordering::Relaxed) && pending() {
                backoff.snooze();
            }

            if !pending() {
                return AcquireOutcome::AlreadyServiced;
            }
            backoff.reset();
        }
    }

    #[inline]
    fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    #[inline]
    fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

/// Lock implementation (enum dispatch)
enum LockImpl {
    Spin(SpinFlag),
    Abort(AbortSemaphore),
}

impl LockImpl {
    #[inline(always)]
    fn try_acquire(&self) -> bool {
        match self {
            Self::Spin(l) => l.try_acquire(),
            Self::Abort(l) => l.try_acquire(),
        }
    }

    #[inline(always)]
    fn acquire(&self, pending: impl Fn() -> bool) -> AcquireOutcome {
        match self {
            Self::Spin(l) => l.acquire(pending),
            Self::Abort(l) => l.acquire(pending),
        }
    }

    #[inline(always)]
    fn release(&self) {
        match self {
            Self::Spin(l) => l.release(),
            Self::Abort(l) => l.release(),
        }
    }

    #[inline(always)]
    fn is_held(&self) -> bool {
        match self {
            Self::Spin(l) => l.is_held(),
            Self::Abort(l) => l.is_held(),
        }
    }
}

/// Combiner election lock owning the combiner-only state `S`
pub struct CombinerLock<S> {
    imp: LockImpl,
    discipline: LockDiscipline,
    state: UnsafeCell<S>,
}

// Safety: `state` is only reachable through a guard, and at most one guard
// exists at a time.
unsafe impl<S: Send> Send for CombinerLock<S> {}
unsafe impl<S: Send> Sync for CombinerLock<S> {}

/// Outcome of [`CombinerLock::acquire`]
pub enum Acquisition<'a, S> {
    /// The caller is the combiner until the guard drops
    Acquired(CombinerGuard<'a, S>),
    /// Another combiner serviced the caller's request
    AlreadyServiced,
}

impl<S> CombinerLock<S> {
    /// Create a lock using `discipline`, owning `state`
    pub fn new(discipline: LockDiscipline, spin_limit: u32, state: S) -> Self {
        let imp = match discipline {
            LockDiscipline::Spin => LockImpl::Spin(SpinFlag::new(spin_limit)),
            LockDiscipline::AbortSemaphore => LockImpl::Abort(AbortSemaphore::new()),
        };
        Self {
            imp,
            discipline,
            state: UnsafeCell::new(state),
        }
    }

    /// Compete for the combiner role until elected or serviced
    ///
    /// `pending` reports whether the caller's own request still awaits an
    /// answer; once it returns false the caller stops competing.
    #[inline]
    pub fn acquire(&self, pending: impl Fn() -> bool) -> Acquisition<'_, S> {
        match self.imp.acquire(pending) {
            AcquireOutcome::Acquired => Acquisition::Acquired(CombinerGuard { lock: self }),
            AcquireOutcome::AlreadyServiced => Acquisition::AlreadyServiced,
        }
    }

    /// Non-blocking attempt to become combiner
    #[inline]
    pub fn try_acquire(&self) -> Option<CombinerGuard<'_, S>> {
        self.imp
            .try_acquire()
            .then(|| CombinerGuard { lock: self })
    }

    /// Whether a combiner is currently active (advisory)
    #[inline]
    pub fn is_held(&self) -> bool {
        self.imp.is_held()
    }

    /// The discipline chosen at construction
    #[inline]
    pub fn discipline(&self) -> LockDiscipline {
        self.discipline
    }

    /// Exclusive access without locking, available when the lock is owned
    #[inline]
    pub fn get_mut(&mut self) -> &mut S {
        self.state.get_mut()
    }
}

/// Proof of holding the combiner role; releases on drop
pub struct CombinerGuard<'a, S> {
    lock: &'a CombinerLock<S>,
}

impl<S> Deref for CombinerGuard<'_, S> {
    type Target = S;

    #[inline(always)]
    fn deref(&self) -> &S {
        // Safety: the guard is the unique holder of the lock
        unsafe { &*self.lock.state.get() }
    }
}

impl<S> DerefMut for CombinerGuard<'_, S> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut S {
        // Safety: the guard is the unique holder of the lock
        unsafe { &mut *self.lock.state.get() }
    }
}

impl<S> Drop for CombinerGuard<'_, S> {
    fn drop(&mut self) {
        self.lock.imp.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use std::thread;

    fn hammer(discipline: LockDiscipline) {
        let lock = Arc::new(CombinerLock::new(discipline, 8, 0u64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        match lock.acquire(|| true) {
                            Acquisition::Acquired(mut guard) => *guard += 1,
                            Acquisition::AlreadyServiced => unreachable!(),
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut lock = Arc::try_unwrap(lock).ok().unwrap();
        assert_eq!(*lock.get_mut(), 8000);
    }

    #[test]
    fn test_spin_mutual_exclusion() {
        hammer(LockDiscipline::Spin);
    }

    #[test]
    fn test_abort_mutual_exclusion() {
        hammer(LockDiscipline::AbortSemaphore);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        for discipline in [LockDiscipline::Spin, LockDiscipline::AbortSemaphore] {
            let lock = CombinerLock::new(discipline, 4, ());
            {
                let _guard = lock.try_acquire().unwrap();
                assert!(lock.is_held());
                assert!(lock.try_acquire().is_none());
            }
            assert!(!lock.is_held());
            assert_eq!(lock.discipline(), discipline);
        }
    }

    #[test]
    fn test_serviced_waiter_returns_without_lock() {
        for discipline in [LockDiscipline::Spin, LockDiscipline::AbortSemaphore] {
            let lock = Arc::new(CombinerLock::new(discipline, 4, ()));
            let answer = Arc::new(AtomicU64::new(0));
            let guard = lock.try_acquire().unwrap();

            let waiter = {
                let lock = lock.clone();
                let answer = answer.clone();
                thread::spawn(move || {
                    matches!(
                        lock.acquire(|| answer.load(Ordering::SeqCst) == 0),
                        Acquisition::AlreadyServiced
                    )
                })
            };

            thread::sleep(std::time::Duration::from_millis(20));
            answer.store(7, Ordering::SeqCst);
            drop(guard);

            assert!(waiter.join().unwrap());
        }
    }
}
