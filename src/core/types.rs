/*!
 * Core Types
 * Common types used across the combining structures
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied thread index in `0..num_threads`
pub type ThreadId = usize;

/// Identifier handed out by the tuner for one registered structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TuningId(pub u32);

impl fmt::Display for TuningId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tune#{}", self.0)
    }
}

/// Outcome of one combining session, reported by the structure's algorithm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Slot state changes performed (the reward signal)
    pub changes: u64,
    /// Elements inserted by the session
    pub added: usize,
    /// Elements handed back to dequeuers by the session
    pub removed: usize,
}

impl SessionReport {
    /// Whether the session moved any element in or out
    #[inline]
    pub fn made_progress(&self) -> bool {
        self.added != 0 || self.removed != 0
    }
}
