//! Logging configuration for the harness
//!
//! Provides simple tracing-based logging to stderr. Every provider command,
//! poll outcome and reaped object is logged, so a failing run can be
//! replayed from the log alone.
//!
//! # Example
//!
//! ```no_run
//! use nulecule_harness::telemetry::init_logging;
//!
//! init_logging();
//! // Logs will go to stderr with the configured level
//! ```

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "nulecule_harness=debug,info";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Initialize logging with tracing-subscriber
///
/// Uses the RUST_LOG env var for filtering (default: debug for the harness,
/// info for everything else). Safe to call more than once: only the first
/// call installs a subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
                .with_target(true),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging() {
        // Should not panic when called multiple times
        init_logging();
        init_logging();
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
