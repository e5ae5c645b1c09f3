//! Tracing subscriber setup for the binary.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a fmt subscriber writing to stderr (if one is not already active).
///
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. "info" or
/// "metrics_sync=debug") is used. Calling this more than once is harmless.
pub fn init_tracing(default_level: &str) {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();

    let _ = TRACING_INIT.set(());
}
