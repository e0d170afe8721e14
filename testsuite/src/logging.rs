use tracing_subscriber::EnvFilter;

/// Routes `redis_fixture` logs to the test output, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("redis_fixture=debug")))
        .try_init();
}
