/*!
 * Publication Slots
 *
 * One request/answer cell per thread id, linked once into an append-only
 * list that combiners scan.
 *
 * ## Ownership
 *
 * A slot's payload is written by its owning thread while the slot is idle or
 * answered, and by the combiner while a request is outstanding. The state
 * word hands the payload back and forth with release/acquire pairs, so the
 * two writers never overlap.
 *
 * ## List shape
 *
 * Publication pushes onto the front of the list with a CAS. The list ends in
 * a permanent sentinel whose `next` is null; a scan stops at the first slot
 * whose `next` is null, so the sentinel itself is never yielded. Slots are
 * never unlinked, so a scan can walk the list without any reclamation scheme.
 */

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, Ordering};

/// Request/answer state of a slot
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No request; also the answer to an enqueue and to an empty dequeue
    Idle = 0,
    /// Enqueue request, payload holds the element
    Enqueue = 1,
    /// Dequeue request, payload empty
    Dequeue = 2,
    /// Dequeue buffered by the current combiner, answer still being assembled
    DequeuePending = 3,
    /// Dequeue answered, payload holds the element
    Answered = 4,
}

impl SlotState {
    #[inline(always)]
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Enqueue,
            2 => Self::Dequeue,
            3 => Self::DequeuePending,
            4 => Self::Answered,
            _ => Self::Idle,
        }
    }

    /// Whether a request in this state still awaits its answer
    #[inline(always)]
    pub fn is_outstanding(self) -> bool {
        matches!(self, Self::Enqueue | Self::Dequeue | Self::DequeuePending)
    }
}

/// A thread's request/answer cell
pub struct Slot<T> {
    state: CachePadded<AtomicU8>,
    payload: UnsafeCell<Option<T>>,
    next: AtomicPtr<Slot<T>>,
    claimed: AtomicBool,
}

// Safety: the payload is handed between the owner and the combiner through
// `state` with release/acquire ordering; only one side touches it at a time.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU8::new(SlotState::Idle as u8)),
            payload: UnsafeCell::new(None),
            next: AtomicPtr::new(ptr::null_mut()),
            claimed: AtomicBool::new(false),
        }
    }

    /// Current state (acquire)
    #[inline(always)]
    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline(always)]
    fn set_state(&self, state: SlotState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether the slot's own request is still outstanding
    #[inline(always)]
    pub fn is_pending(&self) -> bool {
        self.state().is_outstanding()
    }

    #[inline]
    fn is_linked(&self) -> bool {
        !self.next.load(Ordering::Acquire).is_null()
    }
}

/// Exclusive use of a slot by its owning thread for one operation
///
/// Two OS threads sharing one thread id would both write the payload;
/// claiming turns that misuse into a panic.
pub struct SlotClaim<'a, T> {
    slot: &'a Slot<T>,
}

impl<'a, T> SlotClaim<'a, T> {
    fn new(slot: &'a Slot<T>, thread_id: usize) -> Self {
        assert!(
            !slot.claimed.swap(true, Ordering::Acquire),
            "thread id {thread_id} is used by two threads at once"
        );
        Self { slot }
    }

    /// The claimed slot
    #[inline(always)]
    pub fn slot(&self) -> &'a Slot<T> {
        self.slot
    }

    /// Post an enqueue request carrying `item`
    #[inline]
    pub fn post_enqueue(&self, item: T) {
        debug_assert!(!self.slot.is_pending());
        // Safety: the slot is idle or answered, so the owner holds the payload
        unsafe { *self.slot.payload.get() = Some(item) };
        self.slot.set_state(SlotState::Enqueue);
    }

    /// Post a dequeue request
    #[inline]
    pub fn post_dequeue(&self) {
        debug_assert!(!self.slot.is_pending());
        // Safety: as above
        unsafe { *self.slot.payload.get() = None };
        self.slot.set_state(SlotState::Dequeue);
    }

    /// Collect the answer of a serviced request
    #[inline]
    pub fn take_answer(&self) -> Option<T> {
        match self.slot.state() {
            SlotState::Answered => {
                // Safety: `Answered` hands the payload back to the owner
                let item = unsafe { (*self.slot.payload.get()).take() };
                self.slot.set_state(SlotState::Idle);
                item
            }
            _ => None,
        }
    }
}

impl<T> Drop for SlotClaim<'_, T> {
    fn drop(&mut self) {
        self.slot.claimed.store(false, Ordering::Release);
    }
}

/// Combiner-side view of a slot yielded by a scan
///
/// Only a combining session can create these, which is what makes the
/// payload-moving methods sound.
pub struct SlotRef<'s, T> {
    slot: &'s Slot<T>,
}

impl<T> Clone for SlotRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SlotRef<'_, T> {}

impl<'s, T> SlotRef<'s, T> {
    /// Current state of the slot
    #[inline(always)]
    pub fn state(&self) -> SlotState {
        self.slot.state()
    }

    /// Take the element of an enqueue request and mark the slot idle
    #[inline]
    pub fn take_enqueue(&self) -> Option<T> {
        if self.slot.state() != SlotState::Enqueue {
            return None;
        }
        // Safety: `Enqueue` hands the payload to the combiner
        let item = unsafe { (*self.slot.payload.get()).take() };
        self.slot.set_state(SlotState::Idle);
        item
    }

    /// Deliver `item` as the answer to a dequeue request
    #[inline]
    pub fn answer(&self, item: T) {
        debug_assert!(matches!(
            self.slot.state(),
            SlotState::Dequeue | SlotState::DequeuePending
        ));
        // Safety: the combiner holds the payload while the dequeue is outstanding
        unsafe { *self.slot.payload.get() = Some(item) };
        self.slot.set_state(SlotState::Answered);
    }

    /// Answer a dequeue request with "nothing to remove"
    #[inline]
    pub fn answer_empty(&self) {
        self.slot.set_state(SlotState::Idle);
    }

    /// Mark a dequeue as buffered so later passes skip it
    #[inline]
    pub fn mark_pending(&self) {
        self.slot.set_state(SlotState::DequeuePending);
    }
}

/// Append-only list of published slots plus the per-thread slot table
pub struct SlotList<T> {
    head: CachePadded<AtomicPtr<Slot<T>>>,
    by_thread: Box<[AtomicPtr<Slot<T>>]>,
}

// Safety: slots are shared by pointer but only mutated through atomics or
// under the ownership protocol described above.
unsafe impl<T: Send> Send for SlotList<T> {}
unsafe impl<T: Send> Sync for SlotList<T> {}

impl<T> SlotList<T> {
    /// Create an empty list with room for `num_threads` thread ids
    pub fn new(num_threads: usize) -> Self {
        let sentinel = Box::into_raw(Box::new(Slot::new()));
        let by_thread = (0..num_threads)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            by_thread,
        }
    }

    /// Number of thread ids this list serves
    #[inline]
    pub fn capacity(&self) -> usize {
        self.by_thread.len()
    }

    /// The slot of `thread_id`, allocating it on first use
    pub fn get_or_create(&self, thread_id: usize) -> &Slot<T> {
        assert!(
            thread_id < self.by_thread.len(),
            "thread id {thread_id} out of range (0..{})",
            self.by_thread.len()
        );

        let entry = &self.by_thread[thread_id];
        let existing = entry.load(Ordering::Acquire);
        if !existing.is_null() {
            // Safety: table entries are set once and live as long as the list
            return unsafe { &*existing };
        }

        let fresh = Box::into_raw(Box::new(Slot::new()));
        match entry.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => unsafe { &*fresh },
            Err(winner) => {
                // Safety: `fresh` was never shared
                drop(unsafe { Box::from_raw(fresh) });
                unsafe { &*winner }
            }
        }
    }

    /// Claim `thread_id`'s slot for one operation
    #[inline]
    pub fn claim(&self, thread_id: usize) -> SlotClaim<'_, T> {
        SlotClaim::new(self.get_or_create(thread_id), thread_id)
    }

    /// Link `slot` into the scan list unless it already is
    pub fn publish(&self, slot: &Slot<T>) {
        if slot.is_linked() {
            return;
        }

        let raw = slot as *const Slot<T> as *mut Slot<T>;
        let mut current = self.head.load(Ordering::Acquire);
        loop {
            slot.next.store(current, Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(current, raw, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Walk every published slot, newest first
    #[inline]
    pub(crate) fn scan(&self) -> SlotScan<'_, T> {
        SlotScan {
            current: self.head.load(Ordering::Acquire),
            _list: std::marker::PhantomData,
        }
    }

    /// Number of published slots (walks the list)
    pub fn published(&self) -> usize {
        self.scan().count()
    }
}

impl<T> Drop for SlotList<T> {
    fn drop(&mut self) {
        // Slots created but never published are only in the table.
        for entry in self.by_thread.iter_mut() {
            let raw = *entry.get_mut();
            // Safety: nothing has been freed yet, every table entry is live
            if !raw.is_null() && !unsafe { (*raw).is_linked() } {
                drop(unsafe { Box::from_raw(raw) });
            }
        }

        let mut current = *self.head.get_mut();
        while !current.is_null() {
            // Safety: every linked slot and the sentinel were boxed by this list
            let slot = unsafe { Box::from_raw(current) };
            current = slot.next.load(Ordering::Relaxed);
        }
    }
}

/// Lazy walk over the published slots, ending at the sentinel
pub(crate) struct SlotScan<'a, T> {
    current: *mut Slot<T>,
    _list: std::marker::PhantomData<&'a SlotList<T>>,
}

impl<'a, T> Iterator for SlotScan<'a, T> {
    type Item = SlotRef<'a, T>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        // Safety: the list never frees a slot while borrowed
        let slot = unsafe { &*self.current };
        let next = slot.next.load(Ordering::Acquire);
        if next.is_null() {
            return None;
        }
        self.current = next;
        Some(SlotRef { slot })
    }
}
