use tracing_subscriber::EnvFilter;

/// Initialize logging for tests.
///
/// Logs are hidden unless the `ENABLE_LOGS` environment variable is set.
/// The level is controlled with `RUST_LOG` and defaults to DEBUG.
pub fn init() {
    if std::env::var("ENABLE_LOGS").is_ok() {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .try_init();
    }
}
