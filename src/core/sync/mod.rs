/*!
 * Synchronization Primitives
 *
 * Building blocks of the combiner election:
 * - Combiner lock with spin and abort-semaphore disciplines
 * - Abort semaphore built on `parking_lot_core` parking
 * - Exponential backoff for waiters
 *
 * # Architecture
 *
 * The lock owns the combiner-only state of a structure and hands it out
 * through a guard, so holding the combiner role and mutating the structure
 * are the same capability.
 */

mod abort;
mod backoff;
mod combiner;
mod config;

pub use abort::{AbortSemaphore, AcquireOutcome};
pub use backoff::{delay, SpinBackoff};
pub use combiner::{Acquisition, CombinerGuard, CombinerLock};
pub use config::{FcConfig, LockDiscipline, TunerConfig, TuningMode};
