/*!
 * Flat-Combining FIFO Queue
 *
 * Elements are stored in batches, one per combining session. During a
 * session every serviced enqueue is appended to the open batch; at the end of
 * the session the open batch is linked behind the existing ones. Dequeues
 * drain the oldest linked batch and free it once exhausted.
 *
 * ## Pass discipline
 *
 * - Enqueues are serviced on every pass
 * - Dequeues are serviced only on the final pass, from linked batches
 *
 * A session therefore never hands out an element it enqueued itself; those
 * become visible to the next session.
 *
 * ## Batch growth
 *
 * The open batch starts with room for four elements. A session that fills it
 * moves the contents into a batch four elements larger, and later sessions
 * start at the larger capacity.
 */

use crate::combining::{
    Combine, CombiningContext, ConcurrentCollection, FlatCombiner, Session, SlotState,
};
use crate::core::errors::FcResult;
use crate::core::limits::{QUEUE_BATCH_GROWTH, QUEUE_INITIAL_BATCH, QUEUE_PASS_STRIDE};
use crate::core::sync::FcConfig;
use crate::core::types::{SessionReport, ThreadId};
use std::collections::VecDeque;
use std::mem;
use tracing::debug;

/// Batch of elements linked by one session, drained front to back
type Batch<T> = std::vec::IntoIter<T>;

/// Combiner-owned queue storage
pub struct QueueCore<T> {
    linked: VecDeque<Batch<T>>,
    open: Vec<T>,
    batch_capacity: usize,
}

impl<T> QueueCore<T> {
    pub fn new() -> Self {
        Self {
            linked: VecDeque::new(),
            open: Vec::new(),
            batch_capacity: QUEUE_INITIAL_BATCH,
        }
    }

    /// Capacity the next open batch starts with
    #[inline]
    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }

    /// Number of batches holding unread elements
    #[inline]
    pub fn batches(&self) -> usize {
        self.linked.len()
    }

    /// Elements stored (walks the batches)
    pub fn len(&self) -> usize {
        self.linked.iter().map(ExactSizeIterator::len).sum::<usize>() + self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored elements, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.linked
            .iter()
            .flat_map(|batch| batch.as_slice().iter())
            .chain(self.open.iter())
    }

    fn push_open(&mut self, item: T) {
        if self.open.capacity() == 0 {
            self.open.reserve_exact(self.batch_capacity);
        }
        self.open.push(item);

        if self.open.len() >= self.batch_capacity {
            let grown = self.batch_capacity + QUEUE_BATCH_GROWTH;
            let mut larger = Vec::with_capacity(grown);
            larger.append(&mut self.open);
            self.open = larger;
            self.batch_capacity = grown;
            debug!(capacity = grown, "Queue batch grown");
        }
    }

    fn pop_linked(&mut self) -> Option<T> {
        while let Some(front) = self.linked.front_mut() {
            if let Some(item) = front.next() {
                if front.len() == 0 {
                    self.linked.pop_front();
                }
                return Some(item);
            }
            self.linked.pop_front();
        }
        None
    }

    fn link_open(&mut self) {
        if !self.open.is_empty() {
            let batch = mem::take(&mut self.open);
            self.linked.push_back(batch.into_iter());
        }
    }
}

impl<T> Default for QueueCore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Combine for QueueCore<T> {
    type Item = T;
    const PASS_STRIDE: u32 = QUEUE_PASS_STRIDE;
    const ADAPTIVE_NAME: &'static str = "SmartQueue";
    const FIXED_NAME: &'static str = "FCQueue";

    fn combine(&mut self, session: &Session<'_, T>) -> SessionReport {
        let mut report = SessionReport::default();
        let last = session.passes() - 1;

        for pass in 0..session.passes() {
            for slot in session.scan() {
                match slot.state() {
                    SlotState::Enqueue => {
                        if let Some(item) = slot.take_enqueue() {
                            self.push_open(item);
                            report.added += 1;
                            report.changes += 1;
                        }
                    }
                    SlotState::Dequeue if pass == last => {
                        match self.pop_linked() {
                            Some(item) => {
                                slot.answer(item);
                                report.removed += 1;
                            }
                            None => slot.answer_empty(),
                        }
                        report.changes += 1;
                    }
                    _ => {}
                }
            }
        }

        self.link_open();
        report
    }
}

/// Concurrent FIFO queue built on flat combining
///
/// Named `SmartQueue` when its pass count is learned and `FCQueue` when it
/// runs with a constant pass count.
pub struct SmartQueue<T: Send> {
    inner: FlatCombiner<QueueCore<T>>,
}

impl<T: Send> SmartQueue<T> {
    /// Create a queue against the shared tuner and monitor in `ctx`
    pub fn new(config: FcConfig, ctx: &CombiningContext) -> FcResult<Self> {
        Ok(Self {
            inner: FlatCombiner::new(config, ctx, QueueCore::new())?,
        })
    }

    /// Create a queue for `num_threads` thread ids with private services
    pub fn with_threads(num_threads: usize) -> FcResult<Self> {
        Self::new(
            FcConfig::default().with_threads(num_threads),
            &CombiningContext::default(),
        )
    }

    /// Enqueue `item`
    #[inline]
    pub fn enqueue(&self, thread_id: ThreadId, item: T) {
        self.inner.add(thread_id, item);
    }

    /// Dequeue the oldest element visible to the servicing session
    #[inline]
    pub fn dequeue(&self, thread_id: ThreadId) -> Option<T> {
        self.inner.remove(thread_id)
    }

    /// Whether every thread id's last session made no progress
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.inner.is_dead()
    }

    /// Combining sessions run so far
    #[inline]
    pub fn sessions(&self) -> u64 {
        self.inner.sessions()
    }

    /// Capacity the next open batch starts with
    pub fn batch_capacity(&self) -> usize {
        self.inner.with_state(QueueCore::batch_capacity)
    }

    #[inline]
    pub fn config(&self) -> &FcConfig {
        self.inner.config()
    }
}

impl<T: Send + Clone> SmartQueue<T> {
    /// Copy of the stored elements, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.with_state(|core| core.iter().cloned().collect())
    }
}

impl<T: Send> ConcurrentCollection for SmartQueue<T> {
    type Item = T;

    fn add(&self, thread_id: ThreadId, item: T) -> bool {
        self.enqueue(thread_id, item);
        true
    }

    fn remove(&self, thread_id: ThreadId) -> Option<T> {
        self.dequeue(thread_id)
    }

    /// The queue has no membership query
    fn contain(&self, _thread_id: ThreadId, _query: &T) -> Option<T> {
        None
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
