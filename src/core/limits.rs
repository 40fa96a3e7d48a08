/*!
 * Combining Limits and Constants
 *
 * Centralized location for the sizing constants of the combining protocol,
 * the tuner and the two data structures.
 *
 * - Performance-critical constants are marked with [PERF]
 * - Constants that bound memory or bitmask width are marked with [BOUND]
 */

use std::time::Duration;

// =============================================================================
// THREADS
// =============================================================================

/// Maximum number of registered threads per structure
/// [BOUND] The dead-thread bitmask is a single u64
pub const MAX_THREADS: usize = 64;

/// Default number of registered threads
pub const DEFAULT_THREADS: usize = 16;

// =============================================================================
// COMBINER LOCK
// =============================================================================

/// Spin iterations (as 2^step) before a spinning waiter starts yielding
/// [PERF] Short critical sections usually finish inside this window
pub const SPIN_LIMIT: u32 = 6;

/// Default number of backoff steps before a waiter re-reads the lock flag
pub const DEFAULT_SPIN_LIMIT: u32 = 10;

// =============================================================================
// TUNING
// =============================================================================

/// One session in this many draws an exploration value instead of the
/// learned best value. Must be a power of two.
pub const EXPLORE_INTERVAL: u64 = 256;

/// Number of discrete values the default policy chooses between
pub const DEFAULT_TUNING_LEVELS: u32 = 4;

/// Weight of the newest reward in the per-value estimate
pub const DEFAULT_LEARNING_RATE: f64 = 0.25;

/// Passes added per discrete tuning step for the queue combiner
pub const QUEUE_PASS_STRIDE: u32 = 10;

/// Passes added per discrete tuning step for the skip list combiner
pub const SKIPLIST_PASS_STRIDE: u32 = 4;

// =============================================================================
// QUEUE
// =============================================================================

/// Capacity of the first batch node opened by a combiner
pub const QUEUE_INITIAL_BATCH: usize = 4;

/// Capacity added each time a session overflows the open batch node
pub const QUEUE_BATCH_GROWTH: usize = 4;

// =============================================================================
// SKIP LIST
// =============================================================================

/// Height of the head and tail sentinels
pub const SKIPLIST_MAX_LEVEL: usize = 20;

/// Dequeue requests one skip list session may buffer
/// [BOUND] Exceeding it is a session-size misconfiguration
pub const REMOVAL_BUFFER_CAPACITY: usize = 1024;

// =============================================================================
// HEARTBEAT
// =============================================================================

/// First backoff delay of `wait_for_change`
pub const HEARTBEAT_BACKOFF_START: Duration = Duration::from_nanos(100);

/// Largest backoff delay of `wait_for_change`; the wait gives up after it
pub const HEARTBEAT_BACKOFF_MAX: Duration = Duration::from_nanos(1600);
