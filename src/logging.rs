//! Diagnostic logging for plugin binaries
//!
//! Stdout belongs to the protocol, so logs always go to stderr.

use tracing_subscriber::EnvFilter;

/// Default filter when none is configured
pub const DEFAULT_FILTER: &str = "warn";

/// Installs a stderr subscriber using `filter` (an `EnvFilter` directive
/// such as `debug` or `cni_skel=trace`). An invalid directive falls back
/// to [`DEFAULT_FILTER`]. Calling this more than once is a no-op.
pub fn init(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
