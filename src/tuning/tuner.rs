/*!
 * Adaptive Tuner
 *
 * Service object shared by every structure that learns its combiner pass
 * budget. Structures register once for a tuning id, then per session either
 * explore (`sampled_value`) or exploit (`best_value`) and report the session's
 * work back through `feedback`.
 *
 * The reward handed to the policy is a rate: slot-state changes per
 * microsecond of session time, so longer pass budgets only win when they
 * buy proportionally more work.
 */

use super::policy::{GreedyBandit, TuningPolicy};
use crate::core::errors::FcResult;
use crate::core::sync::TunerConfig;
use crate::core::types::{ThreadId, TuningId};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

/// One session's draw, carried until the session reports back
#[derive(Debug, Clone, Copy)]
pub struct TuningTicket {
    pub id: TuningId,
    pub thread_id: ThreadId,
    pub value: u32,
    pub explore: bool,
    pub started: Instant,
}

/// Shared tuning service
pub struct AdaptiveTuner {
    policy: Box<dyn TuningPolicy>,
    next_id: AtomicU32,
    feedbacks: AtomicU64,
}

impl AdaptiveTuner {
    /// Create a tuner driven by `policy`
    pub fn new(policy: Box<dyn TuningPolicy>) -> Self {
        debug!(policy = policy.name(), "Adaptive tuner created");
        Self {
            policy,
            next_id: AtomicU32::new(0),
            feedbacks: AtomicU64::new(0),
        }
    }

    /// Create a tuner using the greedy bandit with `config`
    pub fn with_config(config: TunerConfig) -> FcResult<Self> {
        config.validate()?;
        Ok(Self::new(Box::new(GreedyBandit::new(config))))
    }

    /// Register a structure and hand out its tuning id
    pub fn register(&self, structure: &str) -> TuningId {
        let id = TuningId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.policy.register(id);
        debug!(structure, %id, "Registered tuning id");
        id
    }

    /// Exploration draw
    #[inline]
    pub fn sampled_value(&self, id: TuningId) -> u32 {
        self.policy.sample(id)
    }

    /// Exploitation draw for `thread_id`
    #[inline]
    pub fn best_value(&self, id: TuningId, thread_id: ThreadId) -> u32 {
        self.policy.best(id, thread_id)
    }

    /// Draw a value for one session and start its clock
    #[inline]
    pub fn begin(&self, id: TuningId, thread_id: ThreadId, explore: bool) -> TuningTicket {
        let value = if explore {
            self.sampled_value(id)
        } else {
            self.best_value(id, thread_id)
        };
        TuningTicket {
            id,
            thread_id,
            value,
            explore,
            started: Instant::now(),
        }
    }

    /// Report the work a session performed with its drawn value
    pub fn feedback(&self, ticket: &TuningTicket, reward: u64) {
        let micros = ticket.started.elapsed().as_secs_f64() * 1e6;
        let rate = reward as f64 / micros.max(1e-3);
        self.policy
            .feedback(ticket.id, ticket.thread_id, ticket.value, rate);
        self.feedbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of feedback reports received
    pub fn feedback_count(&self) -> u64 {
        self.feedbacks.load(Ordering::Relaxed)
    }

    /// Number of tuning ids handed out
    pub fn registered(&self) -> u32 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Discrete values the policy chooses from
    pub fn levels(&self) -> u32 {
        self.policy.levels()
    }

    /// The active policy's name
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }
}

impl Default for AdaptiveTuner {
    fn default() -> Self {
        Self::new(Box::new(GreedyBandit::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::FixedPolicy;

    #[test]
    fn test_register_hands_out_distinct_ids() {
        let tuner = AdaptiveTuner::default();
        let a = tuner.register("queue");
        let b = tuner.register("skiplist");
        assert_ne!(a, b);
        assert_eq!(tuner.registered(), 2);
    }

    #[test]
    fn test_begin_explore_and_exploit() {
        let tuner = AdaptiveTuner::new(Box::new(FixedPolicy(2)));
        let id = tuner.register("queue");

        let exploit = tuner.begin(id, 0, false);
        assert!(!exploit.explore);
        assert_eq!(exploit.value, 2);

        let explore = tuner.begin(id, 0, true);
        assert!(explore.explore);
        assert_eq!(explore.value, 2);
    }

    #[test]
    fn test_feedback_reaches_policy() {
        let tuner = AdaptiveTuner::default();
        let id = tuner.register("queue");

        let ticket = TuningTicket {
            id,
            thread_id: 0,
            value: 3,
            explore: true,
            started: Instant::now(),
        };
        tuner.feedback(&ticket, 100);

        assert_eq!(tuner.best_value(id, 0), 3);
        assert_eq!(tuner.feedback_count(), 1);
    }

    #[test]
    fn test_with_config_validates() {
        assert!(AdaptiveTuner::with_config(TunerConfig {
            levels: 0,
            ..Default::default()
        })
        .is_err());
        let tuner = AdaptiveTuner::with_config(TunerConfig::default()).unwrap();
        assert_eq!(tuner.policy_name(), "greedy_bandit");
        assert_eq!(tuner.levels(), 4);
    }
}
