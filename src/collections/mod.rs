/*!
 * Collections
 *
 * Flat-combining structures exposed through [`ConcurrentCollection`]:
 * a FIFO queue and a skip list ordered by key.
 *
 * [`ConcurrentCollection`]: crate::combining::ConcurrentCollection
 */

mod queue;
mod skiplist;

pub use queue::{QueueCore, SmartQueue};
pub use skiplist::{Keyed, SkipCore, SmartSkipList};
