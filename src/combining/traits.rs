/*!
 * Combining Traits
 *
 * The uniform add/remove/contain vocabulary shared by every structure, and the
 * hook a structure implements to be driven by the combining engine.
 */

use super::engine::Session;
use crate::core::types::{SessionReport, ThreadId};

/// Concurrent collection addressed by caller-supplied thread ids
///
/// `add` and `remove` return only once the request has been serviced, either
/// by the caller acting as combiner or by another thread's combining session.
pub trait ConcurrentCollection: Send + Sync {
    type Item;

    /// Insert `item`; never fails
    fn add(&self, thread_id: ThreadId, item: Self::Item) -> bool;

    /// Remove one element, `None` when there was nothing to remove
    fn remove(&self, thread_id: ThreadId) -> Option<Self::Item>;

    /// Membership style query; structures without one answer `None`
    fn contain(&self, thread_id: ThreadId, query: &Self::Item) -> Option<Self::Item>;

    /// Tracked number of elements (advisory under concurrency)
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Diagnostic identifier
    fn name(&self) -> &'static str;
}

/// Structure state mutated by combining sessions
///
/// `combine` runs with the combiner role held; it is the only code that
/// touches the structure's nodes.
pub trait Combine: Send {
    type Item: Send;

    /// Pass budget added per tuning step (`passes = 1 + PASS_STRIDE * value`)
    const PASS_STRIDE: u32;

    /// Name of builds whose pass count is learned
    const ADAPTIVE_NAME: &'static str;

    /// Name of builds with a constant pass count
    const FIXED_NAME: &'static str;

    /// Service the published requests for `session.passes()` passes
    fn combine(&mut self, session: &Session<'_, Self::Item>) -> SessionReport;
}
