//! Filesystem change notifications for one scan path.
//!
//! Every directory under the scan path is watched non-recursively, and
//! directories created later are added as they appear. Raw notifications are
//! reduced to the ones that can change a manifest and forwarded through a
//! channel of capacity one, so a burst of changes costs at most one extra
//! regeneration.

use crate::rules::is_ignore_file;
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Kind of change a notification stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    /// Something appeared, by creation or by being renamed into place.
    Created,
    /// File content was written.
    Written,
}

/// A live set of watches plus the channels it reports through.
///
/// Dropping the subscription stops delivery and releases the watches.
pub struct Subscription {
    events: mpsc::Receiver<PathBuf>,
    errors: mpsc::Receiver<anyhow::Error>,
    pump: JoinHandle<()>,
}

impl Subscription {
    /// Starts watching `scan_path`. Changes to `manifest_path` itself are never
    /// reported.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be created or a directory under
    /// the scan path cannot be watched.
    pub async fn start(scan_path: &Path, manifest_path: &Path) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let root = scan_path.to_path_buf();
        let watcher = tokio::task::spawn_blocking(move || watch_tree(&root, raw_tx))
            .await
            .context("Watch setup task panicked")??;

        let (event_tx, events) = mpsc::channel(1);
        let (error_tx, errors) = mpsc::channel(1);
        let pump = tokio::spawn(pump(
            watcher,
            raw_rx,
            event_tx,
            error_tx,
            manifest_path.to_path_buf(),
        ));

        Ok(Self {
            events,
            errors,
            pump,
        })
    }

    /// Borrows the change and error channels separately, for use in one `select!`.
    pub fn channels(
        &mut self,
    ) -> (
        &mut mpsc::Receiver<PathBuf>,
        &mut mpsc::Receiver<anyhow::Error>,
    ) {
        (&mut self.events, &mut self.errors)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Creates a watcher and registers every directory under `root`.
fn watch_tree(
    root: &Path,
    raw_tx: mpsc::UnboundedSender<notify::Result<Event>>,
) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = raw_tx.send(res);
    })
    .context("Failed to create filesystem watcher")?;

    let watched = add_directories(&mut watcher, root)?;
    debug!(root = %root.display(), watched, "Watching directories");
    Ok(watcher)
}

/// Watches `dir` and every directory below it. Returns how many were added.
fn add_directories(watcher: &mut RecommendedWatcher, dir: &Path) -> Result<usize> {
    let mut watched = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err)
                if err
                    .io_error()
                    .is_some_and(|e| e.kind() == ErrorKind::PermissionDenied) =>
            {
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to scan {}", dir.display()));
            }
        };

        if entry.file_type().is_dir() {
            watcher
                .watch(entry.path(), RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", entry.path().display()))?;
            watched += 1;
        }
    }
    Ok(watched)
}

/// Reduces a raw notification to the path it is about, if it matters.
fn classify(event: &Event) -> Option<(Change, &Path)> {
    let change = match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            Change::Created
        }
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => Change::Written,
        _ => return None,
    };

    let path = event.paths.last()?;
    match change {
        Change::Created => Some((change, path.as_path())),
        // Content edits only matter when they change the rules.
        Change::Written => is_ignore_file(path).then_some((change, path.as_path())),
    }
}

/// Watches a directory that appeared after setup, off the async threads.
async fn watch_new_directory(watcher: &Arc<Mutex<RecommendedWatcher>>, dir: PathBuf) {
    let watcher = Arc::clone(watcher);
    let shown = dir.clone();
    let added = tokio::task::spawn_blocking(move || -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut watcher = watcher.lock().unwrap_or_else(PoisonError::into_inner);
        add_directories(&mut watcher, &dir)
    })
    .await
    .context("Watch task panicked");

    // The directory may already be gone again; nothing to watch then.
    match added.and_then(|result| result) {
        Ok(0) => {}
        Ok(watched) => debug!(path = %shown.display(), watched, "Watching new directory"),
        Err(e) => debug!(path = %shown.display(), error = %e, "Could not watch new directory"),
    }
}

async fn pump(
    watcher: RecommendedWatcher,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    event_tx: mpsc::Sender<PathBuf>,
    error_tx: mpsc::Sender<anyhow::Error>,
    manifest_path: PathBuf,
) {
    let watcher = Arc::new(Mutex::new(watcher));

    while let Some(res) = raw_rx.recv().await {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                let _ = error_tx.try_send(anyhow::Error::new(e).context("Filesystem watcher error"));
                continue;
            }
        };

        let Some((change, path)) = classify(&event) else {
            trace!(kind = ?event.kind, paths = ?event.paths, "Ignoring event");
            continue;
        };

        if path == manifest_path {
            trace!(path = %path.display(), "Ignoring change to own manifest");
            continue;
        }

        // Watched before the regeneration it triggers, so its contents are seen.
        if change == Change::Created {
            watch_new_directory(&watcher, path.to_path_buf()).await;
        }

        debug!(path = %path.display(), ?change, "Change detected");
        // A full slot already guarantees a pending regeneration.
        let _ = event_tx.try_send(path.to_path_buf());
    }
}
