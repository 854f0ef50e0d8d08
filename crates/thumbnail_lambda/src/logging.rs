use tracing_subscriber::EnvFilter;

/// JSON log lines on stderr for CloudWatch. Time is omitted because CloudWatch
/// stamps ingestion time; the level filter comes from `RUST_LOG` (default `info`).
/// Stdout stays free for the local runner's response document.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_current_span(false)
        .with_writer(std::io::stderr)
        .init();
}
