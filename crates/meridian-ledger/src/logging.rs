//! # Logging Setup
//!
//! Installs the global `tracing` subscriber for a ledger process.
//!
//! `RUST_LOG` wins over the configured level. JSON output is meant for log
//! shippers; the text format is for terminals.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Builds the filter: `RUST_LOG` if set, otherwise the configured level
/// with sqlx quietened.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.level)))
}

/// Initializes the global subscriber.
///
/// Returns `false` if a subscriber was already installed (tests, or a host
/// application that configured its own).
pub fn init(config: &LoggingConfig) -> bool {
    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!config.json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_ok()
}
