/*!
 * Monitoring
 * Heartbeat reward signal and structured tracing
 */

mod heartbeat;
mod tracer;

pub use heartbeat::{Heartbeat, Monitor};
pub use tracer::{init_tracing, SessionSpan};
