use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, span};

/// Outcome of asking one matcher about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A pattern matched the path (or one of its parents below the matcher's directory).
    Ignore,
    /// A `!` pattern explicitly re-included the path.
    Whitelist,
    /// No pattern in this file has an opinion.
    None,
}

/// A compiled ignore file anchored at the directory that contains it.
///
/// Matchers are immutable once built and are owned by exactly one
/// [`IgnoreStack`](super::IgnoreStack) frame.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    dir: PathBuf,
    source: PathBuf,
    gitignore: Gitignore,
}

impl PatternMatcher {
    /// Compiles the ignore file at `path`, anchored at its parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if any line is not a
    /// valid gitignore pattern (for example an unclosed character class).
    pub fn from_file(path: &Path) -> Result<Self> {
        let span = span!(Level::DEBUG, "compile_ignore_file", path = %path.display());
        let _guard = span.enter();

        let dir = path
            .parent()
            .with_context(|| format!("Ignore file has no parent directory: {}", path.display()))?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read ignore file: {}", path.display()))?;

        let matcher = Self::from_lines(dir, path, content.lines())?;
        debug!(patterns = matcher.len(), "Ignore file compiled");
        Ok(matcher)
    }

    /// Compiles patterns given as individual lines.
    ///
    /// `source` is only used to label errors and debug output.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending line if a pattern is malformed.
    pub fn from_lines<'a, I>(dir: &Path, source: &Path, lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut builder = GitignoreBuilder::new(dir);
        for (index, line) in lines.into_iter().enumerate() {
            builder
                .add_line(Some(source.to_path_buf()), line)
                .with_context(|| {
                    format!(
                        "Invalid pattern on line {} of {}: {line:?}",
                        index + 1,
                        source.display()
                    )
                })?;
        }

        let gitignore = builder
            .build()
            .with_context(|| format!("Failed to compile ignore file: {}", source.display()))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            source: source.to_path_buf(),
            gitignore,
        })
    }

    /// Directory this matcher is anchored at.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the ignore file the patterns came from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gitignore.num_ignores() as usize + self.gitignore.num_whitelists() as usize
    }

    /// Returns true if the file held no patterns (only blanks and comments).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gitignore.is_empty()
    }

    /// Asks this matcher about `path`.
    ///
    /// Only paths strictly below [`dir`](Self::dir) can match. The directory
    /// itself and anything outside it always yield [`Verdict::None`]. Parents of
    /// `path` below the anchor are consulted too, so a file inside an ignored
    /// directory inherits the directory's verdict.
    #[must_use]
    pub fn verdict(&self, path: &Path, is_dir: bool) -> Verdict {
        let Ok(relative) = path.strip_prefix(&self.dir) else {
            return Verdict::None;
        };
        if relative.as_os_str().is_empty() {
            return Verdict::None;
        }

        let found = self.gitignore.matched_path_or_any_parents(relative, is_dir);
        if found.is_ignore() {
            Verdict::Ignore
        } else if found.is_whitelist() {
            Verdict::Whitelist
        } else {
            Verdict::None
        }
    }
}
