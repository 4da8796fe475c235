use super::{Entry, Mode};
use crate::rules::IgnoreStack;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, span, trace};
use walkdir::WalkDir;

/// A single traversal of one root directory.
///
/// Ignore files are picked up as the walk descends. A directory's own ignore
/// files apply to its children, never to the directory itself. Pruned
/// directories are not descended into, so nothing below an excluded directory
/// is ever stat-ed or read.
///
/// # Examples
///
/// ```no_run
/// use backlist::manifest::{Mode, TreeWalker};
///
/// # fn main() -> anyhow::Result<()> {
/// let entries = TreeWalker::new("/home/me/documents", Mode::Restic).walk()?;
/// for entry in &entries {
///     println!("{}", entry.path.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    mode: Mode,
    skip: HashSet<PathBuf>,
}

impl TreeWalker {
    /// Creates a walker for `root`. The root should be absolute.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            root: root.into(),
            mode,
            skip: HashSet::new(),
        }
    }

    /// Never report `path`, typically the manifest being written.
    #[must_use]
    pub fn skip_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip.insert(path.into());
        self
    }

    /// The walk root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the tree and returns the entries that belong in the manifest, in
    /// depth-first order.
    ///
    /// Only leaves are returned: files, and directories with nothing retained
    /// below them. A directory that lost all of its children to patterns is
    /// dropped as well. In syncthing mode the root itself is never returned.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed ignore file or on any I/O error other
    /// than permission denied. Unreadable directories are treated as absent.
    pub fn walk(&self) -> Result<Vec<Entry>> {
        let span = span!(Level::DEBUG, "walk", root = %self.root.display(), mode = %self.mode);
        let _guard = span.enter();

        let mut stack = IgnoreStack::new();
        let mut retained: Vec<Entry> = Vec::new();
        let mut hollow: HashSet<PathBuf> = HashSet::new();
        let mut pruned = 0usize;

        let mut it = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        while let Some(next) = it.next() {
            let dent = match next {
                Ok(dent) => dent,
                Err(err) if is_permission_denied(&err) => {
                    debug!(path = ?err.path(), "Permission denied, skipping");
                    // The directory was reported before its listing failed.
                    if let Some(path) = err.path()
                        && retained.last().is_some_and(|e| e.path == path)
                    {
                        retained.pop();
                    }
                    continue;
                }
                Err(err) => {
                    let path = err
                        .path()
                        .map_or_else(|| self.root.display().to_string(), |p| p.display().to_string());
                    return Err(err).with_context(|| format!("Failed to walk {path}"));
                }
            };

            let depth = dent.depth();
            let path = dent.path();
            let is_dir = dent.file_type().is_dir();

            if depth == 0 {
                if !is_dir {
                    // A single file root: nothing to match it against.
                    if self.mode == Mode::Restic {
                        retained.push(Entry::new(path, false));
                    }
                    break;
                }
                stack
                    .push(path, 0)
                    .with_context(|| format!("Failed to load ignore rules in {}", path.display()))?;
                retained.push(Entry::new(path, true));
                continue;
            }

            stack.truncate_to(depth);

            if self.skip.contains(path) {
                trace!(path = %path.display(), "Skipping excluded path");
                if let Some(parent) = path.parent() {
                    hollow.insert(parent.to_path_buf());
                }
                continue;
            }

            let matched = stack.matches(path, is_dir);
            if self.mode.prunes(matched) {
                trace!(path = %path.display(), matched, "Pruned");
                pruned += 1;
                if let Some(parent) = path.parent() {
                    hollow.insert(parent.to_path_buf());
                }
                if is_dir {
                    it.skip_current_dir();
                }
                continue;
            }

            if is_dir {
                if self.mode == Mode::Syncthing {
                    // An ignored directory is ignored as a whole.
                    it.skip_current_dir();
                } else {
                    stack.push(path, depth).with_context(|| {
                        format!("Failed to load ignore rules in {}", path.display())
                    })?;
                }
            }

            retained.push(Entry::new(path, is_dir));
        }

        let entries = self.leaves(retained, &hollow);
        debug!(entries = entries.len(), pruned, "Walk complete");
        Ok(entries)
    }

    /// Keeps files and directories that have nothing retained below them.
    ///
    /// `retained` is in pre-order, so a directory has a retained descendant
    /// exactly when the next entry lies below it.
    fn leaves(&self, retained: Vec<Entry>, hollow: &HashSet<PathBuf>) -> Vec<Entry> {
        let mut leaves = Vec::with_capacity(retained.len());
        let mut iter = retained.into_iter().peekable();

        while let Some(entry) = iter.next() {
            if !entry.is_dir {
                leaves.push(entry);
                continue;
            }

            let has_descendant = iter
                .peek()
                .is_some_and(|next| next.path != entry.path && next.path.starts_with(&entry.path));
            if has_descendant || hollow.contains(&entry.path) {
                continue;
            }
            if self.mode == Mode::Syncthing && entry.path == self.root {
                continue;
            }
            leaves.push(entry);
        }

        leaves
    }
}

fn is_permission_denied(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == ErrorKind::PermissionDenied)
}
