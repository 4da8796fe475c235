#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]
#![allow(clippy::arithmetic_side_effects)] // Counters over directory entries cannot overflow
#![allow(clippy::indexing_slicing)] // Bounds checked by logic

//! # Backlist - Backup and Sync Manifest Generator
//!
//! Backlist walks directory trees, applies the `.gitignore` and
//! `.backlistignore` files it finds on the way, and writes the result as a
//! manifest: a `restic --files-from` list of paths to back up, or a
//! syncthing `.stignore` list of paths to leave out.
//!
//! Manifests can be generated once, or kept up to date by a watch job that
//! regenerates whenever files appear or ignore rules change.
//!
//! ## Architecture
//!
//! - [`rules`]: gitignore pattern matching and the cascading ignore stack
//! - [`manifest`]: tree walking, the manifest file and one-shot generation
//! - [`watch`]: long-running jobs, their status and the job registry
//! - [`hooks`]: user commands around every regeneration
//! - [`backup`]: one-shot backups through a backup provider
//! - [`config`]: configuration loading and checks
//! - [`output`]: terminal output
//!
//! ## Example Usage
//!
//! ```no_run
//! use backlist::manifest::{Mode, generate};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> anyhow::Result<()> {
//! let added = generate(
//!     Path::new("/tmp/home.list"),
//!     Mode::Restic,
//!     false,
//!     &[PathBuf::from("/home/me")],
//! )?;
//! println!("{added} paths to back up");
//! # Ok(())
//! # }
//! ```

/// One-shot backups driven by generated manifests.
pub mod backup;

/// Command-line interface definitions (argument parsing structures).
pub mod cli;

/// Command implementations behind the CLI.
pub mod commands;

/// Configuration parsing, validation, and management.
pub mod config;

/// Pre- and post-generation hooks.
pub mod hooks;

/// Log subscriber setup for the binary.
pub mod logging;

/// Tree walking and manifest files.
pub mod manifest;

/// Output formatting for the CLI.
pub mod output;

/// Ignore-file parsing and matching.
pub mod rules;

/// Utility functions and helpers.
pub mod utils;

/// Long-running manifest jobs.
pub mod watch;

/// Shared fixtures for unit tests.
#[cfg(test)]
pub mod test_utils;

pub use manifest::{Manifest, Mode, TreeWalker, generate};
pub use rules::{IgnoreStack, PatternMatcher};
pub use watch::{JobRegistry, Status, WatchJob};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Current version of the backlist binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct BacklistContext {
    /// Path the configuration was loaded from. The file may not exist.
    pub config_path: PathBuf,

    /// Loaded configuration settings.
    pub config: config::Config,

    /// Whether to run in non-interactive mode (no prompts).
    /// Used primarily for testing to prevent stdin reads.
    pub non_interactive: bool,
}

impl BacklistContext {
    /// Loads the configuration from `explicit`, `$BACKLIST_CONFIG` or the
    /// default location, and sizes the walk pool from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read,
    /// parsed or validated.
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        let config_path = config::Config::resolve_path(explicit);
        let config = config::Config::load(&config_path).with_context(|| {
            format!("Failed to load configuration from {}", config_path.display())
        })?;

        if let Err(e) = utils::thread_pool::init_thread_pool(config.performance.parallel_threads) {
            eprintln!("Warning: Failed to configure thread pool: {e}");
        }

        Ok(Self {
            config_path,
            config,
            non_interactive: false,
        })
    }

    /// Creates a context from an explicit file without touching global state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be loaded.
    pub fn new_explicit(config_path: PathBuf) -> Result<Self> {
        let config = config::Config::load(&config_path)?;
        Ok(Self {
            config_path,
            config,
            non_interactive: true,
        })
    }
}
