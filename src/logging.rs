use anyhow::{Context, Result};
use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

/// Builds the log filter. `RUST_LOG` wins over `level` when it is set.
///
/// # Errors
///
/// Returns an error if `level` is not a valid filter directive.
pub fn filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: '{level}'")),
    }
}

/// Installs the global subscriber, writing formatted events to stderr.
///
/// Only the binary calls this. A second call is an error.
///
/// # Errors
///
/// Returns an error if the level is invalid or a subscriber is already set.
pub fn init(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level)?)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))
}
