use tracing_subscriber::EnvFilter;

/// Initialises the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `default_level` is used. Called
/// once by the binaries; libraries only emit events.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Like [`init_logging`] but tolerates an already-installed subscriber,
/// which happens when several tests share one process.
pub fn try_init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
