//! Logging setup for binaries embedding LIFT8

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber honouring `RUST_LOG`, falling back to `default_directive`.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
