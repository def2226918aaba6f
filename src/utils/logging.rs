use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process.
///
/// `default_level` applies when `RUST_LOG` is not set; the env variable wins
/// otherwise. Uses `try_init` so tests can call this repeatedly without
/// panicking.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
