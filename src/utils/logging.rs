//! Tracing setup for embedding hosts.
//!
//! The crate emits `tracing` events on its streaming and accounting paths;
//! hosts that want them call [`init_tracing`] once at startup. Filtering
//! follows the usual `RUST_LOG` conventions (e.g. `palaver=debug`).

use tracing_subscriber::EnvFilter;

/// Install a global subscriber reading its filter from `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
