/*!
 * Adaptive Flat Combining Library
 * Concurrent queue and skip list built on flat combining, with a learned
 * combiner pass budget and a heartbeat reward monitor
 */

pub mod collections;
pub mod combining;
pub mod core;
pub mod monitoring;
pub mod tuning;

// Re-exports
pub use collections::{Keyed, SmartQueue, SmartSkipList};
pub use combining::{CombiningContext, ConcurrentCollection, FlatCombiner};
pub use crate::core::errors::*;
pub use crate::core::sync::{FcConfig, LockDiscipline, TunerConfig, TuningMode};
pub use crate::core::types::*;
pub use monitoring::{init_tracing, Heartbeat, Monitor};
pub use tuning::{AdaptiveTuner, FixedPolicy, GreedyBandit, TuningPolicy};
