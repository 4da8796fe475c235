//! The on-disk manifest.
//!
//! Generated lines live between a pair of marker comments. Anything outside
//! the markers was written by hand and is carried over untouched when the
//! manifest is regenerated in append mode. The region itself always mirrors
//! the latest walk, so paths that became excluded drop out of it:
//!
//! ```text
//! # Generated by backlist. Lines between the markers are managed automatically.
//! # BEGIN backlist
//! /home/me/documents/notes.txt
//! # END backlist
//! ```
//!
//! Syncthing manifests use `//` instead of `#`, which is what `.stignore` treats
//! as a comment.

use super::{Entry, Mode};
use crate::utils::paths::ensure_parent_dirs;
use anyhow::{Context, Result, bail};
use fs4::fs_std::FileExt;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, debug, span, warn};

/// Header line written above the generated region.
#[must_use]
pub fn generated_by(mode: Mode) -> String {
    format!(
        "{} Generated by backlist. Lines between the markers are managed automatically.",
        mode.comment_prefix()
    )
}

/// Opening marker of the generated region.
#[must_use]
pub fn begin_marker(mode: Mode) -> String {
    format!("{} BEGIN backlist", mode.comment_prefix())
}

/// Closing marker of the generated region.
#[must_use]
pub fn end_marker(mode: Mode) -> String {
    format!("{} END backlist", mode.comment_prefix())
}

/// Lines of an existing manifest, split around the generated region.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Layout {
    before: Vec<String>,
    region: Vec<String>,
    after: Vec<String>,
}

impl Layout {
    fn parse(content: &str, mode: Mode) -> Self {
        let header = generated_by(mode);
        let begin = begin_marker(mode);
        let end = end_marker(mode);

        let lines: Vec<&str> = content.lines().collect();
        let start = lines.iter().position(|line| *line == begin);
        let stop = start.and_then(|s| {
            lines[s + 1..]
                .iter()
                .position(|line| *line == end)
                .map(|offset| s + 1 + offset)
        });

        let owned = |slice: &[&str]| slice.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();

        match (start, stop) {
            (Some(start), Some(stop)) => {
                let mut before = owned(&lines[..start]);
                if before.last().is_some_and(|line| *line == header) {
                    before.pop();
                }
                Self {
                    before,
                    region: owned(&lines[start + 1..stop]),
                    after: owned(&lines[stop + 1..]),
                }
            }
            // No complete region: everything is hand-written.
            _ => Self {
                before: owned(&lines),
                ..Self::default()
            },
        }
    }

    /// Renders the preserved lines around a freshly generated `region`.
    fn render(&self, mode: Mode, region: &[String]) -> String {
        let mut out = String::new();
        let mut line = |l: &str| {
            out.push_str(l);
            out.push('\n');
        };

        for l in &self.before {
            line(l);
        }
        line(&generated_by(mode));
        line(&begin_marker(mode));
        for l in region {
            line(l);
        }
        line(&end_marker(mode));
        for l in &self.after {
            line(l);
        }
        out
    }
}

/// An open manifest file.
///
/// The file is exclusively locked from [`open`](Self::open) until
/// [`close`](Self::close) or drop. Entries are buffered in memory and only
/// reach the disk on `close`, where they replace the generated region.
/// Dropping a manifest without closing it discards the buffer and leaves the
/// file as it was.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    mode: Mode,
    append: bool,
    file: Option<File>,
    layout: Layout,
    /// Hand-written lines outside the markers. Never repeated in the region.
    manual: HashSet<String>,
    /// Region lines as of `open`, to tell new lines from kept ones.
    previous: HashSet<String>,
    /// Everything buffered so far, for dedup across roots.
    listed: HashSet<String>,
    pending: Vec<String>,
}

impl Manifest {
    /// Opens (creating if needed) the manifest at `path` and locks it.
    ///
    /// With `append`, the current content is read so that hand-written lines
    /// outside the generated region survive and are not repeated inside it.
    /// Without it, the whole file is replaced on close.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or read, or if another
    /// writer holds the lock.
    pub fn open(path: &Path, mode: Mode, append: bool) -> Result<Self> {
        let span = span!(Level::DEBUG, "manifest_open", path = %path.display(), %mode, append);
        let _guard = span.enter();

        ensure_parent_dirs(path)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open manifest: {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(true) => {}
            Ok(false) => bail!(
                "Manifest {} is locked by another writer",
                path.display()
            ),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to lock manifest: {}", path.display()));
            }
        }

        let (layout, manual) = if append {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)
                .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
            let content = simdutf8::basic::from_utf8(&bytes).map_err(|e| {
                anyhow::anyhow!("Invalid UTF-8 in manifest {}: {e}", path.display())
            })?;

            let layout = Layout::parse(content, mode);
            let manual = layout
                .before
                .iter()
                .chain(&layout.after)
                .filter(|line| !line.is_empty())
                .cloned()
                .collect::<HashSet<_>>();
            (layout, manual)
        } else {
            (Layout::default(), HashSet::new())
        };
        let previous = layout.region.iter().cloned().collect::<HashSet<_>>();

        debug!(manual = manual.len(), generated = previous.len(), "Manifest opened");

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            append,
            file: Some(file),
            layout,
            manual,
            previous,
            listed: HashSet::new(),
            pending: Vec::new(),
        })
    }

    /// Path of the manifest file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Interpretation of the entries.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether existing content is kept.
    #[must_use]
    pub const fn append(&self) -> bool {
        self.append
    }

    /// Lines buffered for the next close.
    #[must_use]
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Returns true once the manifest has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Buffers the entries of a walk of `root`, skipping lines that are
    /// already buffered or written by hand.
    ///
    /// Returns how many of the buffered lines were not in the generated
    /// region before.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest was already closed.
    pub fn write_entries(&mut self, root: &Path, entries: &[Entry]) -> Result<usize> {
        if self.is_closed() {
            bail!("Manifest {} is already closed", self.path.display());
        }

        let mut added = 0;
        for entry in entries {
            let line = entry.render(root, self.mode);
            if self.manual.contains(&line) || !self.listed.insert(line.clone()) {
                continue;
            }
            if !self.previous.contains(&line) {
                added += 1;
            }
            self.pending.push(line);
        }
        Ok(added)
    }

    /// Replaces the generated region with the buffered lines and releases the
    /// lock.
    ///
    /// In append mode, when the region would come out unchanged the file is
    /// left untouched, so repeated generations over an unchanged tree are
    /// byte-identical. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or syncing the file fails.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        let span = span!(Level::DEBUG, "manifest_close", path = %self.path.display());
        let _guard = span.enter();

        if self.append && self.pending == self.layout.region {
            debug!("Nothing changed, leaving manifest untouched");
        } else {
            let content = self.layout.render(self.mode, &self.pending);
            let dropped = self
                .layout
                .region
                .iter()
                .filter(|line| !self.listed.contains(*line))
                .count();
            file.set_len(0)
                .and_then(|()| file.seek(SeekFrom::Start(0)).map(|_| ()))
                .and_then(|()| file.write_all(content.as_bytes()))
                .and_then(|()| file.sync_all())
                .with_context(|| format!("Failed to write manifest: {}", self.path.display()))?;
            debug!(lines = self.pending.len(), dropped, "Manifest written");

            self.layout.region = std::mem::take(&mut self.pending);
        }

        if let Err(e) = FileExt::unlock(&file) {
            warn!(path = %self.path.display(), error = %e, "Failed to unlock manifest");
        }
        Ok(())
    }
}

impl Drop for Manifest {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if !self.pending.is_empty() {
                debug!(
                    path = %self.path.display(),
                    discarded = self.pending.len(),
                    "Manifest dropped without close"
                );
            }
            let _ = FileExt::unlock(&file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn entry(path: &str) -> Entry {
        Entry::new(path, false)
    }

    #[test]
    fn test_layout_parse_without_markers() {
        let layout = Layout::parse("/manual/a\n/manual/b\n", Mode::Restic);
        assert_eq!(layout.before, vec!["/manual/a", "/manual/b"]);
        assert!(layout.region.is_empty());
        assert!(layout.after.is_empty());
    }

    #[test]
    fn test_layout_parse_with_markers() {
        let content = format!(
            "/top\n{}\n{}\n/x\n/y\n{}\n/bottom\n",
            generated_by(Mode::Restic),
            begin_marker(Mode::Restic),
            end_marker(Mode::Restic)
        );
        let layout = Layout::parse(&content, Mode::Restic);
        assert_eq!(layout.before, vec!["/top"]);
        assert_eq!(layout.region, vec!["/x", "/y"]);
        assert_eq!(layout.after, vec!["/bottom"]);
    }

    #[test]
    fn test_layout_unterminated_region_is_manual() {
        let content = format!("{}\n/x\n", begin_marker(Mode::Restic));
        let layout = Layout::parse(&content, Mode::Restic);
        assert_eq!(layout.before.len(), 2);
        assert!(layout.region.is_empty());
    }

    #[test]
    fn test_layout_round_trip() {
        let layout = Layout {
            before: vec!["/a".into()],
            region: vec!["/b".into()],
            after: vec!["/c".into()],
        };
        let rendered = layout.render(Mode::Syncthing, &["/d".to_string()]);
        let parsed = Layout::parse(&rendered, Mode::Syncthing);
        assert_eq!(parsed.before, vec!["/a"]);
        assert_eq!(parsed.region, vec!["/d"]);
        assert_eq!(parsed.after, vec!["/c"]);
    }

    #[test]
    fn test_write_entries_dedups() -> Result<()> {
        let temp = TempDir::new()?;
        let mut manifest = Manifest::open(&temp.path().join("m"), Mode::Restic, false)?;

        let added = manifest.write_entries(Path::new("/"), &[entry("/a"), entry("/a"), entry("/b")])?;
        assert_eq!(added, 2);
        let added = manifest.write_entries(Path::new("/"), &[entry("/b"), entry("/c")])?;
        assert_eq!(added, 1);
        assert_eq!(manifest.pending(), ["/a", "/b", "/c"]);
        Ok(())
    }

    #[test]
    fn test_region_is_rebuilt_on_append() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("m");
        fs::write(
            &path,
            format!(
                "/manual\n{}\n{}\n/stale\n/kept\n{}\n",
                generated_by(Mode::Restic),
                begin_marker(Mode::Restic),
                end_marker(Mode::Restic)
            ),
        )?;

        let mut manifest = Manifest::open(&path, Mode::Restic, true)?;
        let added = manifest.write_entries(
            Path::new("/"),
            &[entry("/kept"), entry("/manual"), entry("/fresh")],
        )?;
        assert_eq!(added, 1);
        assert_eq!(manifest.pending(), ["/kept", "/fresh"]);
        manifest.close()?;

        let layout = Layout::parse(&fs::read_to_string(&path)?, Mode::Restic);
        assert_eq!(layout.before, vec!["/manual"]);
        assert_eq!(layout.region, vec!["/kept", "/fresh"]);
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("m");
        let mut manifest = Manifest::open(&path, Mode::Restic, false)?;
        manifest.write_entries(Path::new("/"), &[entry("/a")])?;
        manifest.close()?;
        let first = fs::read_to_string(&path)?;
        manifest.close()?;
        assert_eq!(fs::read_to_string(&path)?, first);
        assert!(manifest.write_entries(Path::new("/"), &[entry("/b")]).is_err());
        Ok(())
    }

    #[test]
    fn test_second_writer_is_refused() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("m");
        let _first = Manifest::open(&path, Mode::Restic, true)?;
        assert!(Manifest::open(&path, Mode::Restic, true).is_err());
        Ok(())
    }

    #[test]
    fn test_lock_released_on_close() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("m");
        let mut first = Manifest::open(&path, Mode::Restic, true)?;
        first.close()?;
        let mut second = Manifest::open(&path, Mode::Restic, true)?;
        second.close()?;
        Ok(())
    }

    #[test]
    fn test_drop_without_close_discards() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("m");
        fs::write(&path, "/kept\n")?;
        {
            let mut manifest = Manifest::open(&path, Mode::Restic, false)?;
            manifest.write_entries(Path::new("/"), &[entry("/new")])?;
        }
        assert_eq!(fs::read_to_string(&path)?, "/kept\n");
        Ok(())
    }
}
