// Logging setup
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`
///
/// Returns false when a global subscriber was already installed (for example by
/// a test harness or the embedding application); the existing one is kept.
///
/// # Example
///
/// ```no_run
/// topicflow_core::telemetry::init_tracing("info,topicflow_core=debug");
/// ```
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Subscriber for tests: captures output per test and ignores repeat installs
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
