use super::{IGNORE_FILE_NAMES, PatternMatcher, Verdict};
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// One ignore file plus the walk depth of the directory that holds it.
#[derive(Debug)]
struct Frame {
    depth: usize,
    matcher: PatternMatcher,
}

/// The matchers that apply at the walker's current position, deepest last.
///
/// A stack is owned by a single walk. Concurrent walks of different roots
/// each build their own, so nothing about pattern state is shared.
#[derive(Debug, Default)]
pub struct IgnoreStack {
    frames: Vec<Frame>,
}

impl IgnoreStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Pushes a frame for every recognised ignore file present in `dir`.
    ///
    /// Missing files are skipped, as are files the process is not allowed
    /// to read. Returns how many frames were pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if an ignore file exists but contains a malformed
    /// pattern, or cannot be read for a reason other than permissions.
    pub fn push(&mut self, dir: &Path, depth: usize) -> Result<usize> {
        let mut pushed = 0;

        for name in IGNORE_FILE_NAMES {
            let candidate = dir.join(name);
            let content = match fs::metadata(&candidate) {
                Ok(meta) if meta.is_file() => fs::read_to_string(&candidate),
                Ok(_) => continue,
                Err(e) => Err(e),
            };

            let content = match content {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    debug!(path = %candidate.display(), "Skipping unreadable ignore file");
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read ignore file: {}", candidate.display())
                    });
                }
            };

            let matcher = PatternMatcher::from_lines(dir, &candidate, content.lines())?;
            debug!(path = %candidate.display(), depth, "Pushed ignore frame");
            self.push_matcher(matcher, depth);
            pushed += 1;
        }

        Ok(pushed)
    }

    /// Pushes an already compiled matcher.
    pub fn push_matcher(&mut self, matcher: PatternMatcher, depth: usize) {
        self.frames.push(Frame { depth, matcher });
    }

    /// Drops every frame belonging to a directory at `depth` or deeper.
    ///
    /// Called when the walker arrives at an entry of `depth`: any directory at
    /// that depth or below has already been left.
    pub fn truncate_to(&mut self, depth: usize) {
        while self.frames.last().is_some_and(|frame| frame.depth >= depth) {
            self.frames.pop();
        }
    }

    /// Returns true if the deepest frame with an opinion ignores `path`.
    ///
    /// Frames are consulted deepest first. Only frames anchored at a strict
    /// ancestor of `path` are considered. An explicit whitelist in a deeper
    /// frame overrides an ignore in a shallower one.
    #[must_use]
    pub fn matches(&self, path: &Path, is_dir: bool) -> bool {
        for frame in self.frames.iter().rev() {
            match frame.matcher.verdict(path, is_dir) {
                Verdict::Ignore => return true,
                Verdict::Whitelist => return false,
                Verdict::None => {}
            }
        }
        false
    }

    /// Number of active frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if no ignore file is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BACKLISTIGNORE, GITIGNORE};
    use tempfile::TempDir;

    #[test]
    fn test_push_missing_files_is_noop() -> Result<()> {
        let temp = TempDir::new()?;
        let mut stack = IgnoreStack::new();
        assert_eq!(stack.push(temp.path(), 0)?, 0);
        assert!(stack.is_empty());
        Ok(())
    }

    #[test]
    fn test_push_both_files() -> Result<()> {
        let temp = TempDir::new()?;
        fs::write(temp.path().join(GITIGNORE), "*.log\n")?;
        fs::write(temp.path().join(BACKLISTIGNORE), "!keep.log\n")?;

        let mut stack = IgnoreStack::new();
        assert_eq!(stack.push(temp.path(), 0)?, 2);

        // The tool file is pushed last, so its whitelist wins.
        assert!(stack.matches(&temp.path().join("a.log"), false));
        assert!(!stack.matches(&temp.path().join("keep.log"), false));
        Ok(())
    }

    #[test]
    fn test_deeper_frame_overrides_shallower() -> Result<()> {
        let temp = TempDir::new()?;
        let sub = temp.path().join("sub");
        fs::create_dir(&sub)?;
        fs::write(temp.path().join(GITIGNORE), "*.txt\n")?;
        fs::write(sub.join(GITIGNORE), "!notes.txt\n")?;

        let mut stack = IgnoreStack::new();
        stack.push(temp.path(), 0)?;
        stack.push(&sub, 1)?;

        assert!(!stack.matches(&sub.join("notes.txt"), false));
        assert!(stack.matches(&sub.join("other.txt"), false));
        assert!(stack.matches(&temp.path().join("notes.txt"), false));
        Ok(())
    }

    #[test]
    fn test_own_ignore_file_does_not_affect_directory() -> Result<()> {
        let temp = TempDir::new()?;
        let sub = temp.path().join("sub");
        fs::create_dir(&sub)?;
        fs::write(sub.join(GITIGNORE), "*\n")?;

        let mut stack = IgnoreStack::new();
        stack.push(&sub, 1)?;
        assert!(!stack.matches(&sub, true));
        assert!(stack.matches(&sub.join("anything"), false));
        Ok(())
    }

    #[test]
    fn test_truncate_to_pops_left_directories() -> Result<()> {
        let temp = TempDir::new()?;
        let a = temp.path().join("a");
        let b = a.join("b");
        fs::create_dir_all(&b)?;
        fs::write(temp.path().join(GITIGNORE), "x\n")?;
        fs::write(a.join(GITIGNORE), "y\n")?;
        fs::write(b.join(GITIGNORE), "z\n")?;

        let mut stack = IgnoreStack::new();
        stack.push(temp.path(), 0)?;
        stack.push(&a, 1)?;
        stack.push(&b, 2)?;
        assert_eq!(stack.len(), 3);

        // Walker reaches a sibling of `a`.
        stack.truncate_to(1);
        assert_eq!(stack.len(), 1);
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_an_error() -> Result<()> {
        let temp = TempDir::new()?;
        fs::write(temp.path().join(GITIGNORE), "[oops\n")?;

        let mut stack = IgnoreStack::new();
        assert!(stack.push(temp.path(), 0).is_err());
        Ok(())
    }

    #[test]
    fn test_directory_named_like_ignore_file_is_skipped() -> Result<()> {
        let temp = TempDir::new()?;
        fs::create_dir(temp.path().join(GITIGNORE))?;

        let mut stack = IgnoreStack::new();
        assert_eq!(stack.push(temp.path(), 0)?, 0);
        Ok(())
    }
}
