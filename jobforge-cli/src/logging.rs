//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Level priority: the `JOBFORGE_LOG` environment variable, then the
//! config/flag debug switch, then `info`. Logs go to stderr so stdout stays
//! usable in pipelines.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env("JOBFORGE_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
