//! Command implementations behind the CLI.
//!
//! Synchronous commands take plain arguments. The long-running ones are
//! `async` and expect the multi-threaded runtime built in `main`.

pub mod backup;
pub mod generate;
pub mod run;
pub mod watch;

use anyhow::{Context, Result};

/// Resolves once the user presses Ctrl-C.
async fn interrupted() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}
