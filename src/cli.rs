//! Command-line interface definitions for backlist.
//!
//! The CLI definitions are shared between the main binary and build tools
//! (like xtask) for man page generation.
//!
//! Note: Field-level documentation is provided via clap attributes, so we
//! allow `missing_docs` for this module to avoid redundant documentation.

#![allow(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

use crate::manifest::Mode;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Main CLI structure for backlist.
#[derive(Parser, Debug)]
#[command(
    name = "backlist",
    version = crate::VERSION,
    about = "Generate and maintain backup include and sync ignore lists",
    long_about = "Walks directory trees honouring .gitignore and .backlistignore files and \
                  writes restic --files-from lists or syncthing .stignore files, once or \
                  continuously as the tree changes"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Show debug logs
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file
    #[arg(long, global = true, env = "BACKLIST_CONFIG")]
    pub config: Option<PathBuf>,
}

/// All available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Walk one or more roots and write a manifest
    Generate {
        /// How ignore rules are interpreted
        #[arg(short, long, value_enum)]
        mode: Mode,

        /// Manifest file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Keep existing entries and add only new ones
        #[arg(short, long)]
        append: bool,

        /// Directories to walk
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },

    /// Keep one manifest up to date until interrupted
    Watch {
        /// How ignore rules are interpreted
        #[arg(short, long, value_enum)]
        mode: Mode,

        /// Directory to watch (defaults to the manifest's directory)
        #[arg(short, long)]
        scan_path: Option<PathBuf>,

        /// Give up after failing for this long, e.g. "20s" or "2m"
        #[arg(long, value_parser = parse_duration)]
        fail_after: Option<Duration>,

        /// Manifest file to maintain
        manifest: PathBuf,
    },

    /// Run every watch job from the configuration until interrupted
    Run {
        /// Print the final job report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a configured backup
    Backup {
        /// Name of the backup in the configuration
        name: String,
    },

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parses human durations such as `500ms`, `20s` or `1m 30s`. A bare number
/// counts as seconds.
///
/// # Errors
///
/// Returns a message if the text is not a duration.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(text).map_err(|e| format!("invalid duration '{text}': {e}"))
}
