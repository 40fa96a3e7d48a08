/*!
 * Tuning Policies
 *
 * Update rules behind the tuner. A policy keeps whatever per
 * (tuning id, thread) state it needs and answers two questions: which value
 * to try when exploring, and which value is currently believed best.
 */

use crate::core::sync::TunerConfig;
use crate::core::types::{ThreadId, TuningId};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::Arc;

/// Pluggable update rule for the adaptive tuner
pub trait TuningPolicy: Send + Sync {
    /// Prepare state for a newly registered tuning id
    fn register(&self, id: TuningId) {
        let _ = id;
    }

    /// Randomized candidate value for an exploration session
    fn sample(&self, id: TuningId) -> u32;

    /// Value currently believed best for `thread_id`
    fn best(&self, id: TuningId, thread_id: ThreadId) -> u32;

    /// Reward observed for a session that ran with `value`
    fn feedback(&self, id: TuningId, thread_id: ThreadId, value: u32, reward: f64);

    /// Number of discrete values this policy chooses from
    fn levels(&self) -> u32;

    /// Policy name for diagnostics
    fn name(&self) -> &'static str;
}

/// Reward estimates of one (tuning id, thread) pair
#[derive(Debug, Clone)]
struct ArmTable {
    estimates: Vec<f64>,
    pulls: Vec<u64>,
}

impl ArmTable {
    fn new(levels: u32) -> Self {
        Self {
            estimates: vec![0.0; levels as usize],
            pulls: vec![0; levels as usize],
        }
    }

    fn update(&mut self, value: usize, reward: f64, rate: f64) {
        if self.pulls[value] == 0 {
            self.estimates[value] = reward;
        } else {
            self.estimates[value] += rate * (reward - self.estimates[value]);
        }
        self.pulls[value] += 1;
    }

    /// Highest estimate among tried values, lowest value on ties
    fn best(&self) -> Option<u32> {
        let mut best: Option<(usize, f64)> = None;
        for (value, (&estimate, &pulls)) in self.estimates.iter().zip(&self.pulls).enumerate() {
            if pulls == 0 {
                continue;
            }
            match best {
                Some((_, top)) if estimate <= top => {}
                _ => best = Some((value, estimate)),
            }
        }
        best.map(|(value, _)| value as u32)
    }
}

/// Greedy multi-armed bandit over discrete values
///
/// Each (tuning id, thread) pair keeps an exponentially weighted estimate of
/// the reward rate of every value it has tried. Exploitation picks the best
/// estimate; exploration draws uniformly.
pub struct GreedyBandit {
    config: TunerConfig,
    tables: DashMap<(TuningId, ThreadId), Arc<Mutex<ArmTable>>, RandomState>,
}

impl GreedyBandit {
    pub fn new(config: TunerConfig) -> Self {
        Self {
            config,
            tables: DashMap::with_hasher(RandomState::new()),
        }
    }

    fn table(&self, id: TuningId, thread_id: ThreadId) -> Arc<Mutex<ArmTable>> {
        if let Some(table) = self.tables.get(&(id, thread_id)) {
            return table.clone();
        }
        self.tables
            .entry((id, thread_id))
            .or_insert_with(|| Arc::new(Mutex::new(ArmTable::new(self.config.levels))))
            .clone()
    }

    /// Current estimate of `value` for the pair, if it was ever tried
    pub fn estimate(&self, id: TuningId, thread_id: ThreadId, value: u32) -> Option<f64> {
        let table = self.tables.get(&(id, thread_id))?.clone();
        let table = table.lock();
        let idx = value as usize;
        (idx < table.pulls.len() && table.pulls[idx] > 0).then(|| table.estimates[idx])
    }

    /// Fast random number generator (xorshift)
    #[inline]
    fn fast_random() -> u64 {
        thread_local! {
            static STATE: Cell<u64> = Cell::new(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0x9E37_79B9_7F4A_7C15)
                    | 1
            );
        }

        STATE.with(|state| {
            let mut x = state.get();
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            state.set(x);
            x
        })
    }
}

impl Default for GreedyBandit {
    fn default() -> Self {
        Self::new(TunerConfig::default())
    }
}

impl TuningPolicy for GreedyBandit {
    fn sample(&self, _id: TuningId) -> u32 {
        (Self::fast_random() % u64::from(self.config.levels)) as u32
    }

    fn best(&self, id: TuningId, thread_id: ThreadId) -> u32 {
        match self.tables.get(&(id, thread_id)) {
            Some(table) => table.lock().best().unwrap_or(self.config.initial_value),
            None => self.config.initial_value,
        }
    }

    fn feedback(&self, id: TuningId, thread_id: ThreadId, value: u32, reward: f64) {
        if value >= self.config.levels || !reward.is_finite() {
            return;
        }
        let table = self.table(id, thread_id);
        table
            .lock()
            .update(value as usize, reward, self.config.learning_rate);
    }

    fn levels(&self) -> u32 {
        self.config.levels
    }

    fn name(&self) -> &'static str {
        "greedy_bandit"
    }
}

/// Policy that always answers the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub u32);

impl TuningPolicy for FixedPolicy {
    fn sample(&self, _id: TuningId) -> u32 {
        self.0
    }

    fn best(&self, _id: TuningId, _thread_id: ThreadId) -> u32 {
        self.0
    }

    fn feedback(&self, _id: TuningId, _thread_id: ThreadId, _value: u32, _reward: f64) {}

    fn levels(&self) -> u32 {
        self.0 + 1
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
