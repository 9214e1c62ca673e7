//! Diagnostic logging for the `rx` binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` if set, otherwise the configured level.
///
/// Falls back to `info` when `level` is not a valid directive.
pub fn build_env_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber, writing to stderr so stdout stays free
/// for tree output. A second call is a no-op.
pub fn init_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(build_env_filter(level))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
