/*!
 * Flat Combining
 *
 * Publication slots, the combining engine and the collection vocabulary
 * shared by the queue, the skip list and the heartbeat.
 */

mod engine;
mod slot;
mod traits;

pub use engine::{CombiningContext, FlatCombiner, Session};
pub use slot::{Slot, SlotClaim, SlotList, SlotRef, SlotState};
pub use traits::{Combine, ConcurrentCollection};
