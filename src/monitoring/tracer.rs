/*!
 * Structured Tracing
 *
 * The primitives only emit `tracing` events (starvation-mode transitions
 * and hand-offs at `trace`, fatal errors at `error`); installing a
 * subscriber is left to the binary.
 */

use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable selecting JSON output
pub const TRACE_JSON_ENV: &str = "ADAPTIVE_SYNC_TRACE_JSON";

fn json_requested() -> bool {
    std::env::var(TRACE_JSON_ENV)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}

/// Install the global subscriber, returning false if one is already set
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - ADAPTIVE_SYNC_TRACE_JSON: Enable JSON output (default: false)
pub fn try_init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json_requested() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = json_requested(), "tracing initialized");
    }
    installed
}

/// Install the global subscriber
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = try_init_tracing();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        init_tracing();
        assert!(!try_init_tracing());
    }
}
