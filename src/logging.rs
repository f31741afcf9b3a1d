use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install structured logging on stderr.
///
/// The level comes from `RUST_LOG`, defaulting to "info".
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}
