//! Logging setup for hosts embedding the oracle

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a JSON logging subscriber filtered by `RUST_LOG`, defaulting to
/// `INFO`
///
/// Does nothing if the host has already installed a global subscriber.
pub fn setup_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy())
        .with(fmt::layer().with_file(true).with_line_number(true).json().flatten_event(true))
        .try_init();
}
