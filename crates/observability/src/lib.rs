//! `matterflow-observability` — process-wide logging setup for workers.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset: engine crates at debug,
/// everything else at info.
const DEFAULT_FILTER: &str = "info,matterflow_jobs=debug,matterflow_engine=debug";

/// Initialize structured JSON logging for a worker process.
///
/// Filtering is configurable via `RUST_LOG`. Safe to call more than once;
/// subsequent calls are no-ops.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(true)
        .try_init();
}

/// Plain-text variant for local development and test debugging.
pub fn init_pretty() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
