//! Tracing setup for binaries and tests.
//!
//! The crate itself logs through `log` macros and `tracing` spans; this
//! module wires both into one subscriber. Call `init_tracing` once at
//! startup; the filter comes from `RUST_LOG` and defaults to `info`.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global subscriber and routes `log` records through it.
///
/// Returns quietly if a subscriber is already installed, so tests can call
/// it without coordinating.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_log::LogTracer::init();
    let subscriber = fmt().with_env_filter(filter).with_target(true).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
