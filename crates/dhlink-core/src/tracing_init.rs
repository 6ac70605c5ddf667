//! Shared tracing/logging initialization.
//!
//! Every `dhlink` subcommand sets up `tracing_subscriber` the same way: an
//! env-filter plus either human-readable or JSON output.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

const CRATES: [&str; 4] = ["dhlink", "dhlink_core", "dhlink_crypto", "dhlink_proto"];

/// Filter directive enabling `level` for every dhlink crate and nothing else.
pub fn default_filter(level: &str) -> String {
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (see [`default_filter`]).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(default_filter: &str, log_json: bool) -> Result<()> {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into());
    let env_filter = EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{directives}': {e}")))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| Error::Config(format!("Tracing already initialised: {e}")))
}
