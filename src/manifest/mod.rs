//! Manifest generation.
//!
//! A manifest is a plain text file with one path per line. In [`Mode::Restic`]
//! it lists the paths to back up (`restic backup --files-from`). In
//! [`Mode::Syncthing`] it lists the paths to leave out of a sync (`.stignore`).
//!
//! - [`walker`]: one traversal of a root with inline pruning
//! - [`file`]: the on-disk file, its generated region and dedup state
//! - [`generate`]: walking several roots into one manifest

/// On-disk manifest handling.
pub mod file;
/// Multi-root one-shot generation.
pub mod generate;
/// Directory traversal with cascading ignore rules.
pub mod walker;

pub use file::Manifest;
pub use generate::generate;
pub use walker::TreeWalker;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How ignore-rule matches are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Restrictive: the manifest lists paths to include, matches are pruned.
    Restic,
    /// Permissive: the manifest lists paths to ignore, only matches are kept.
    Syncthing,
}

impl Mode {
    /// Lowercase name as used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Restic => "restic",
            Self::Syncthing => "syncthing",
        }
    }

    /// Capitalised name, used in job status reports.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Restic => "Restic",
            Self::Syncthing => "Syncthing",
        }
    }

    /// Line comment prefix understood by the consuming tool.
    #[must_use]
    pub const fn comment_prefix(self) -> &'static str {
        match self {
            Self::Restic => "#",
            Self::Syncthing => "//",
        }
    }

    /// Whether an entry with the given match result is pruned from the walk.
    #[must_use]
    pub const fn prunes(self, matched: bool) -> bool {
        match self {
            Self::Restic => matched,
            Self::Syncthing => !matched,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "restic" => Ok(Self::Restic),
            "syncthing" => Ok(Self::Syncthing),
            other => bail!("Invalid mode '{other}': expected 'restic' or 'syncthing'"),
        }
    }
}

/// A path retained by a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Absolute path of the entry.
    pub path: PathBuf,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl Entry {
    /// Creates an entry.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            is_dir,
        }
    }

    /// Renders the entry as a manifest line.
    ///
    /// Restic lines are absolute. Syncthing lines are relative to `root` with a
    /// leading `/`, since `.stignore` patterns are anchored at the folder root.
    /// Brackets are escaped in both modes so neither tool reads them as a
    /// character class.
    #[must_use]
    pub fn render(&self, root: &Path, mode: Mode) -> String {
        let line = match mode {
            Mode::Restic => crate::utils::paths::to_slash(&self.path),
            Mode::Syncthing => {
                let relative = self.path.strip_prefix(root).unwrap_or(&self.path);
                format!("/{}", crate::utils::paths::to_slash(relative))
            }
        };
        escape(&line)
    }
}

/// Escapes `[` and `]` with a backslash.
#[must_use]
pub fn escape(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for c in line.chars() {
        if matches!(c, '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
