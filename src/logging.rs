//! Logging setup for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application. Logs go to stderr so command output on stdout stays
//! machine-readable.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the filter: `RUST_LOG` wins, then `--verbose`, then `LOG_LEVEL`.
pub fn filter(log_level: &str, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("lakehouse_clients=debug,lakehouse=debug,info")
        } else {
            EnvFilter::new(log_level)
        }
    })
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(log_level: &str, verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(filter(log_level, verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}
