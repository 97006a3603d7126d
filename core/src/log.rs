//! Tracing subscriber bootstrap.

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this more than
/// once is harmless: later calls leave the first subscriber in place.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
