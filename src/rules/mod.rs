//! Hierarchical ignore rules.
//!
//! Every directory may carry a `.gitignore` and a `.backlistignore`. Each file
//! compiles into a [`PatternMatcher`] anchored at its directory, and the walker
//! keeps the matchers of the directories it is currently inside on an
//! [`IgnoreStack`].

/// A single compiled ignore file.
pub mod matcher;
/// The per-walk stack of active matchers.
pub mod stack;

pub use matcher::{PatternMatcher, Verdict};
pub use stack::IgnoreStack;

use std::path::Path;

/// Git's own ignore file.
pub const GITIGNORE: &str = ".gitignore";

/// Tool-specific ignore file, consulted after `.gitignore` rules of the same directory.
pub const BACKLISTIGNORE: &str = ".backlistignore";

/// Recognised ignore file names, in push order.
pub const IGNORE_FILE_NAMES: [&str; 2] = [GITIGNORE, BACKLISTIGNORE];

/// Returns true if the final component of `path` is a recognised ignore file name.
#[must_use]
pub fn is_ignore_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| IGNORE_FILE_NAMES.contains(&name))
}
