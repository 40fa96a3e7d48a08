/*!
 * Flat-Combining Skip List
 *
 * Priority-ordered multiset keyed by [`Keyed::key`]. Removal always takes the
 * smallest key, so the structure behaves as a concurrent priority queue.
 *
 * ## Storage
 *
 * Nodes live in an index arena. Index 0 is the head sentinel (below every
 * key) and index 1 the tail sentinel (above every key); both span all
 * levels. A node's forward array is sized to its own height, and equal keys
 * fold into one node whose `counter` records the multiplicity.
 *
 * ## Session
 *
 * 1. One random height is drawn for every insertion of the session
 * 2. Each pass inserts pending elements and buffers pending removals, marking
 *    the buffered slots so later passes skip them
 * 3. Buffered removals are answered in one sweep from the front of level 0
 * 4. Head pointers are relinked past emptied nodes, and only then are the
 *    emptied nodes returned to the arena
 */

use crate::combining::{
    Combine, CombiningContext, ConcurrentCollection, FlatCombiner, Session, SlotRef, SlotState,
};
use crate::core::errors::{FcError, FcResult};
use crate::core::limits::{REMOVAL_BUFFER_CAPACITY, SKIPLIST_MAX_LEVEL, SKIPLIST_PASS_STRIDE};
use crate::core::sync::FcConfig;
use crate::core::types::{SessionReport, ThreadId};
use std::sync::Arc;

const HEAD: usize = 0;
const TAIL: usize = 1;

/// Element ordered by a key
pub trait Keyed {
    type Key: Ord + Clone + Send;

    fn key(&self) -> Self::Key;
}

macro_rules! impl_keyed_for_int {
    ($($ty:ty),*) => {
        $(
            impl Keyed for $ty {
                type Key = $ty;

                #[inline]
                fn key(&self) -> $ty {
                    *self
                }
            }
        )*
    };
}

impl_keyed_for_int!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl<T: Keyed + ?Sized> Keyed for Arc<T> {
    type Key = T::Key;

    #[inline]
    fn key(&self) -> T::Key {
        (**self).key()
    }
}

impl<K: Ord + Clone + Send, V> Keyed for (K, V) {
    type Key = K;

    #[inline]
    fn key(&self) -> K {
        self.0.clone()
    }
}

struct Node<T: Keyed> {
    /// `None` only for the sentinels
    key: Option<T::Key>,
    item: Option<T>,
    next: Vec<usize>,
    counter: usize,
}

impl<T: Keyed> Node<T> {
    fn sentinel(next: usize) -> Self {
        Self {
            key: None,
            item: None,
            next: vec![next; SKIPLIST_MAX_LEVEL],
            counter: 1,
        }
    }
}

/// Combiner-owned skip list storage
pub struct SkipCore<T: Keyed> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    preds: [usize; SKIPLIST_MAX_LEVEL],
    succs: [usize; SKIPLIST_MAX_LEVEL],
    seed: u64,
}

impl<T: Keyed> SkipCore<T> {
    pub fn new() -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x2545_F491);
        Self::with_seed(seed)
    }

    /// Storage whose height draws start from `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self {
            nodes: vec![Node::sentinel(TAIL), Node::sentinel(TAIL)],
            free: Vec::new(),
            preds: [HEAD; SKIPLIST_MAX_LEVEL],
            succs: [TAIL; SKIPLIST_MAX_LEVEL],
            seed: seed | 1,
        }
    }

    /// Height for this session's insertions, in `1..SKIPLIST_MAX_LEVEL`
    ///
    /// Geometric with ratio 1/2, from a 24-bit xorshift state.
    fn random_level(&mut self) -> usize {
        let mut x = (self.seed & 0xFF_FFFF) as u32;
        if x == 0 {
            x = 0x9E37;
        }
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = u64::from(x);

        if x & 0x8000_0001 != 0 {
            return 1;
        }
        let mut level = 2;
        loop {
            x >>= 1;
            if x & 1 == 0 {
                break;
            }
            level += 1;
        }
        level.min(SKIPLIST_MAX_LEVEL - 1)
    }

    #[inline]
    fn precedes(&self, idx: usize, key: &T::Key) -> bool {
        matches!(&self.nodes[idx].key, Some(k) if k < key)
    }

    /// Fill `preds`/`succs` for `key`; returns the node holding `key`
    fn find(&mut self, key: &T::Key) -> Option<usize> {
        let mut pred = HEAD;
        let mut found = None;

        for level in (0..SKIPLIST_MAX_LEVEL).rev() {
            let mut curr = self.nodes[pred].next[level];
            while self.precedes(curr, key) {
                pred = curr;
                curr = self.nodes[pred].next[level];
            }
            if found.is_none() && self.nodes[curr].key.as_ref() == Some(key) {
                found = Some(curr);
            }
            self.preds[level] = pred;
            self.succs[level] = curr;
        }
        found
    }

    fn alloc(&mut self, key: T::Key, item: T, height: usize) -> usize {
        let node = Node {
            key: Some(key),
            item: Some(item),
            next: vec![TAIL; height],
            counter: 1,
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        let node = &mut self.nodes[idx];
        node.key = None;
        node.item = None;
        node.next = Vec::new();
        self.free.push(idx);
    }

    /// Insert `item`, folding it into an existing node with an equal key
    fn insert(&mut self, item: T, height: usize) {
        let key = item.key();
        if let Some(found) = self.find(&key) {
            self.nodes[found].counter += 1;
            return;
        }

        let idx = self.alloc(key, item, height);
        for level in 0..height {
            self.nodes[idx].next[level] = self.succs[level];
            let pred = self.preds[level];
            self.nodes[pred].next[level] = idx;
        }
    }

    /// Answer buffered removals from the front of level 0
    fn resolve_removals(&mut self, removals: &[SlotRef<'_, T>], report: &mut SessionReport)
    where
        T: Clone,
    {
        let mut current = self.nodes[HEAD].next[0];
        let mut top = 0;
        let mut retired = Vec::new();

        for slot in removals {
            report.changes += 1;
            if current == TAIL {
                slot.answer_empty();
                continue;
            }

            let node = &mut self.nodes[current];
            node.counter -= 1;
            let item = if node.counter == 0 {
                node.item.take()
            } else {
                node.item.clone()
            };
            match item {
                Some(item) => {
                    slot.answer(item);
                    report.removed += 1;
                }
                None => slot.answer_empty(),
            }

            if node.counter == 0 {
                top = top.max(node.next.len());
                retired.push(current);
                current = node.next[0];
            }
        }

        if top > 0 {
            self.unlink_front(top);
        }
        for idx in retired {
            self.release(idx);
        }
    }

    /// Point the head past emptied nodes on levels `0..top`
    fn unlink_front(&mut self, top: usize) {
        let mut pred = HEAD;
        let mut level = top;
        while level > 0 {
            let curr = self.nodes[pred].next[level - 1];
            if curr == TAIL || self.nodes[curr].counter != 0 {
                self.nodes[HEAD].next[level - 1] = curr;
                level -= 1;
            } else {
                pred = curr;
            }
        }
    }

    /// Keys on level 0 with their multiplicity, smallest first
    pub fn entries(&self) -> Vec<(T::Key, usize)> {
        let mut out = Vec::new();
        let mut curr = self.nodes[HEAD].next[0];
        while curr != TAIL {
            let node = &self.nodes[curr];
            if let Some(key) = &node.key {
                out.push((key.clone(), node.counter));
            }
            curr = node.next[0];
        }
        out
    }

    /// Keys reachable on `level`, in link order
    pub fn level_keys(&self, level: usize) -> Vec<T::Key> {
        let mut out = Vec::new();
        let mut curr = self.nodes[HEAD].next[level];
        while curr != TAIL {
            let node = &self.nodes[curr];
            if let Some(key) = &node.key {
                out.push(key.clone());
            }
            curr = node.next[level];
        }
        out
    }

    /// Arena slots currently holding a node, sentinels excluded
    pub fn live_nodes(&self) -> usize {
        self.nodes.len() - 2 - self.free.len()
    }
}

impl<T: Keyed> Default for SkipCore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed + Clone + Send> Combine for SkipCore<T> {
    type Item = T;
    const PASS_STRIDE: u32 = SKIPLIST_PASS_STRIDE;
    const ADAPTIVE_NAME: &'static str = "SmartSkipList";
    const FIXED_NAME: &'static str = "FCSkipList";

    fn combine(&mut self, session: &Session<'_, T>) -> SessionReport {
        let height = self.random_level();
        let mut report = SessionReport::default();
        let mut removals: Vec<SlotRef<'_, T>> = Vec::new();

        for _ in 0..session.passes() {
            for slot in session.scan() {
                match slot.state() {
                    SlotState::Enqueue => {
                        if let Some(item) = slot.take_enqueue() {
                            self.insert(item, height);
                            report.added += 1;
                            report.changes += 1;
                        }
                    }
                    SlotState::Dequeue => {
                        assert!(
                            removals.len() < REMOVAL_BUFFER_CAPACITY,
                            "{}",
                            FcError::RemovalBufferOverflow {
                                capacity: REMOVAL_BUFFER_CAPACITY
                            }
                        );
                        slot.mark_pending();
                        removals.push(slot);
                    }
                    _ => {}
                }
            }
        }

        self.resolve_removals(&removals, &mut report);
        report
    }
}

/// Concurrent skip list built on flat combining
///
/// `remove` takes the element with the smallest key. Elements with equal keys
/// share one node; each removal of such a node hands out a clone of the first
/// element inserted under that key, the last one moving it out.
pub struct SmartSkipList<T: Keyed + Clone + Send> {
    inner: FlatCombiner<SkipCore<T>>,
}

impl<T: Keyed + Clone + Send> SmartSkipList<T> {
    /// Create a skip list against the shared tuner and monitor in `ctx`
    pub fn new(config: FcConfig, ctx: &CombiningContext) -> FcResult<Self> {
        Ok(Self {
            inner: FlatCombiner::new(config, ctx, SkipCore::new())?,
        })
    }

    /// Create a skip list for `num_threads` thread ids with private services
    pub fn with_threads(num_threads: usize) -> FcResult<Self> {
        Self::new(
            FcConfig::default().with_threads(num_threads),
            &CombiningContext::default(),
        )
    }

    /// Insert `item`
    #[inline]
    pub fn insert(&self, thread_id: ThreadId, item: T) {
        self.inner.add(thread_id, item);
    }

    /// Remove an element with the smallest key
    #[inline]
    pub fn pop_min(&self, thread_id: ThreadId) -> Option<T> {
        self.inner.remove(thread_id)
    }

    /// Combining sessions run so far
    #[inline]
    pub fn sessions(&self) -> u64 {
        self.inner.sessions()
    }

    /// Keys with their multiplicity, smallest first
    pub fn entries(&self) -> Vec<(T::Key, usize)> {
        self.inner.with_state(SkipCore::entries)
    }

    #[inline]
    pub fn config(&self) -> &FcConfig {
        self.inner.config()
    }
}

impl<T: Keyed + Clone + Send> ConcurrentCollection for SmartSkipList<T> {
    type Item = T;

    fn add(&self, thread_id: ThreadId, item: T) -> bool {
        self.insert(thread_id, item);
        true
    }

    fn remove(&self, thread_id: ThreadId) -> Option<T> {
        self.pop_min(thread_id)
    }

    /// Membership queries are not supported
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
