/*!
 * Combining Engine
 *
 * Drives the request/answer protocol shared by every flat-combining
 * structure. A caller posts its request in its own slot, makes sure the slot
 * is published, then competes for the combiner role. Whoever wins runs one
 * session over all published slots; everybody else returns as soon as their
 * slot has been answered.
 *
 * ## Session bookkeeping
 *
 * Each session:
 * 1. Picks its pass budget: a constant in fixed builds, otherwise a tuner
 *    draw (exploration on one session in `explore_interval`)
 * 2. Hands a [`Session`] to the structure's [`Combine::combine`]
 * 3. Folds the returned [`SessionReport`] into the size delta and dead mask
 * 4. Reports the change count to the monitor and the tuner
 *
 * The size and dead mask are only written while the combiner role is held,
 * but are read by anyone, hence atomics.
 */

use super::slot::{SlotClaim, SlotList, SlotRef};
use super::traits::Combine;
use crate::core::errors::FcResult;
use crate::core::sync::{Acquisition, CombinerLock, FcConfig, TuningMode};
use crate::core::types::{SessionReport, ThreadId, TuningId};
use crate::monitoring::{Heartbeat, Monitor, SessionSpan};
use crate::tuning::AdaptiveTuner;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicIsize, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared services a structure is built against
#[derive(Clone)]
pub struct CombiningContext {
    pub tuner: Arc<AdaptiveTuner>,
    pub monitor: Option<Arc<dyn Monitor>>,
}

impl CombiningContext {
    pub fn new(tuner: Arc<AdaptiveTuner>, monitor: Arc<dyn Monitor>) -> Self {
        Self {
            tuner,
            monitor: Some(monitor),
        }
    }

    /// Context whose sessions report to no monitor
    pub fn without_monitor(tuner: Arc<AdaptiveTuner>) -> Self {
        Self {
            tuner,
            monitor: None,
        }
    }
}

impl Default for CombiningContext {
    fn default() -> Self {
        Self::new(
            Arc::new(AdaptiveTuner::default()),
            Arc::new(Heartbeat::default()),
        )
    }
}

/// One combining session as seen by the structure
///
/// Only the engine builds these, and only while it holds the combiner role.
pub struct Session<'s, T> {
    slots: &'s SlotList<T>,
    passes: u32,
    thread_id: ThreadId,
}

impl<'s, T> Session<'s, T> {
    pub(crate) fn new(slots: &'s SlotList<T>, passes: u32, thread_id: ThreadId) -> Self {
        Self {
            slots,
            passes: passes.max(1),
            thread_id,
        }
    }

    /// Pass budget of this session (at least 1)
    #[inline]
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Thread id of the combiner
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// One pass over every published slot
    #[inline]
    pub fn scan(&self) -> impl Iterator<Item = SlotRef<'s, T>> + 's {
        self.slots.scan()
    }
}

/// Flat-combining front end over the structure state `S`
pub struct FlatCombiner<S: Combine> {
    name: &'static str,
    config: FcConfig,
    slots: SlotList<S::Item>,
    lock: CombinerLock<S>,
    tuner: Arc<AdaptiveTuner>,
    tuning_id: Option<TuningId>,
    monitor: Option<Arc<dyn Monitor>>,
    sessions: CachePadded<AtomicU64>,
    size: AtomicIsize,
    dead: AtomicU64,
}

impl<S: Combine> FlatCombiner<S> {
    /// Build a combiner around `state`
    pub fn new(config: FcConfig, ctx: &CombiningContext, state: S) -> FcResult<Self> {
        config.validate()?;

        let (name, tuning_id) = if config.is_adaptive() {
            (S::ADAPTIVE_NAME, Some(ctx.tuner.register(S::ADAPTIVE_NAME)))
        } else {
            (S::FIXED_NAME, None)
        };

        debug!(
            structure = name,
            threads = config.num_threads,
            discipline = ?config.discipline,
            tuning = ?config.tuning,
            "Combining structure created"
        );

        Ok(Self {
            name,
            slots: SlotList::new(config.num_threads),
            lock: CombinerLock::new(config.discipline, config.spin_limit, state),
            tuner: ctx.tuner.clone(),
            tuning_id,
            monitor: ctx.monitor.clone(),
            sessions: CachePadded::new(AtomicU64::new(0)),
            size: AtomicIsize::new(0),
            dead: AtomicU64::new(0),
            config,
        })
    }

    /// Post an insert request and wait until it is serviced
    pub fn add(&self, thread_id: ThreadId, item: S::Item) {
        let claim = self.slots.claim(thread_id);
        claim.post_enqueue(item);
        self.slots.publish(claim.slot());
        self.await_answer(thread_id, &claim);
    }

    /// Post a remove request and wait for its answer
    pub fn remove(&self, thread_id: ThreadId) -> Option<S::Item> {
        let claim = self.slots.claim(thread_id);
        claim.post_dequeue();
        self.slots.publish(claim.slot());
        self.await_answer(thread_id, &claim);
        claim.take_answer()
    }

    fn await_answer(&self, thread_id: ThreadId, claim: &SlotClaim<'_, S::Item>) {
        let slot = claim.slot();
        while slot.is_pending() {
            match self.lock.acquire(|| slot.is_pending()) {
                Acquisition::Acquired(mut guard) => self.run_session(&mut guard, thread_id),
                Acquisition::AlreadyServiced => return,
            }
        }
    }

    fn run_session(&self, state: &mut S, thread_id: ThreadId) {
        let count = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;

        let (passes, ticket) = match (self.config.tuning, self.tuning_id) {
            (TuningMode::Adaptive, Some(id)) => {
                let explore = count & self.config.explore_mask() == 0;
                let ticket = self.tuner.begin(id, thread_id, explore);
                let passes = 1 + S::PASS_STRIDE.saturating_mul(ticket.value);
                (passes, Some(ticket))
            }
            (TuningMode::Fixed(n), _) => (n.max(1), None),
            (TuningMode::Adaptive, None) => (1, None),
        };

        let explore = ticket.map_or(false, |t| t.explore);
        let span = SessionSpan::new(self.name, thread_id, passes, explore);
        let report = state.combine(&Session::new(&self.slots, passes, thread_id));
        span.finish(report.changes);

        self.record(thread_id, &report);

        if self.config.auto_reward {
            if let Some(monitor) = &self.monitor {
                monitor.add_reward(thread_id, report.changes);
            }
        }
        if let Some(ticket) = ticket {
            self.tuner.feedback(&ticket, report.changes);
        }
    }

    fn record(&self, thread_id: ThreadId, report: &SessionReport) {
        let delta = report.added as isize - report.removed as isize;
        if delta != 0 {
            self.size.fetch_add(delta, Ordering::Relaxed);
        }

        if report.made_progress() {
            self.dead.store(0, Ordering::Relaxed);
        } else {
            self.dead.fetch_or(1u64 << thread_id, Ordering::Relaxed);
        }
    }

    /// Run `f` against the structure state with the combiner role held
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        loop {
            if let Acquisition::Acquired(guard) = self.lock.acquire(|| true) {
                return f(&guard);
            }
        }
    }

    /// Tracked element count
    #[inline]
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed).max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.load(Ordering::Relaxed) <= 0
    }

    /// Whether the last session of every thread id made no progress
    #[inline]
    pub fn is_dead(&self) -> bool {
        let all = match self.config.num_threads {
            64 => u64::MAX,
            n => (1u64 << n) - 1,
        };
        self.dead.load(Ordering::Relaxed) & all == all
    }

    /// Combining sessions run so far
    #[inline]
    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Structure name (`Smart*` when tuned, `FC*` when fixed)
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn config(&self) -> &FcConfig {
        &self.config
    }

    /// Tuning id of adaptive builds
    #[inline]
    pub fn tuning_id(&self) -> Option<TuningId> {
        self.tuning_id
    }

    /// Number of slots linked into the scan list
    pub fn published_slots(&self) -> usize {
        self.slots.published()
    }
}
