//! Tracing subscriber setup for the binaries

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this
/// more than once is harmless: later calls leave the first subscriber in
/// place.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}
