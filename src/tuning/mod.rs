/*!
 * Adaptive Tuning
 *
 * Online, per-structure and per-thread learning of the combiner pass budget
 * from observed work. The update rule is a pluggable [`TuningPolicy`]; the
 * combiners only consume the integer it produces.
 */

mod policy;
mod tuner;

pub use policy::{FixedPolicy, GreedyBandit, TuningPolicy};
pub use tuner::{AdaptiveTuner, TuningTicket};
