/*!
 * Tracing
 * Structured logging setup and combining-session spans using the tracing crate
 */

use std::time::{Duration, Instant};
use tracing::{info, span, trace, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Sessions longer than this are reported at warn level
const SLOW_SESSION: Duration = Duration::from_millis(10);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - FC_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("FC_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "Combining tracing initialized");
    }
}

/// Span covering one combining session
///
/// Records the pass budget on entry and the change count and duration on
/// completion. The start instant doubles as the session's timing source.
pub struct SessionSpan {
    span: tracing::Span,
    start: Instant,
    structure: &'static str,
}

impl SessionSpan {
    pub fn new(structure: &'static str, thread_id: usize, passes: u32, explore: bool) -> Self {
        let span = span!(
            Level::TRACE,
            "combine",
            structure = structure,
            thread_id = thread_id,
            passes = passes,
            explore = explore,
            changes = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            structure,
        }
    }

    /// Instant the session started
    #[inline]
    pub fn started(&self) -> Instant {
        self.start
    }

    /// Close the span with the session's change count
    pub fn finish(self, changes: u64) -> Duration {
        let elapsed = self.start.elapsed();
        self.span.record("changes", changes);
        let _entered = self.span.enter();

        if elapsed > SLOW_SESSION {
            warn!(
                structure = self.structure,
                duration_ms = elapsed.as_millis() as u64,
                changes,
                "slow combining session"
            );
        } else {
            trace!(duration_ns = elapsed.as_nanos() as u64, changes, "session complete");
        }
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_session_span_measures() {
        let span = SessionSpan::new("test", 0, 3, false);
        let started = span.started();
        std::thread::sleep(Duration::from_millis(1));
        let elapsed = span.finish(4);
        assert!(elapsed >= Duration::from_millis(1));
        assert!(started.elapsed() >= elapsed);
    }
}
