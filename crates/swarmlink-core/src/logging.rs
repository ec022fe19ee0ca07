//! Tracing subscriber setup for hosts and test harnesses.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`.
///
/// Without `RUST_LOG`, swarmlink crates log at `info`, or `debug` when
/// `debug` is set. Safe to call more than once; later calls are no-ops.
pub fn init(debug: bool) {
    let fallback = if debug {
        "swarmlink_core=debug,swarmlink_services=debug"
    } else {
        "swarmlink_core=info,swarmlink_services=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
