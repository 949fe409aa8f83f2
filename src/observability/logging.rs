//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Configure log level from `RUST_LOG` or the `--log-level` flag
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - fmt layer prints RFC 3339 timestamps on every line

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the level filter: `RUST_LOG` wins over the configured directive.
pub fn filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Install the global subscriber.
///
/// Returns an error when a subscriber is already installed.
pub fn init(log_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter(log_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
