//! Long-running manifest maintenance.
//!
//! A [`WatchJob`] generates its manifest once, then subscribes to filesystem
//! notifications for the scan path and regenerates on every relevant change.
//! Failures are retried after a short backoff; a job that has not succeeded
//! for longer than its `fail_after` grace period gives up and stays
//! [`Status::Failed`].
//!
//! ```text
//! WillRun ──initial cycle ok──▶ Running ──shutdown──▶ Stopped
//!    │                          │   ▲
//!    │ initial cycle fails      │   │ resubscribed
//!    ▼                          ▼   │
//!  Failed ◀──past fail_after── WillRun (backoff)
//! ```

/// Bounded error log.
pub mod errors;
/// Job handles keyed by manifest path.
pub mod registry;
/// Filesystem notification plumbing.
pub mod subscription;

pub use errors::{ErrorRing, MAX_ERRORS, TRUNCATION_SENTINEL};
pub use registry::JobRegistry;
pub use subscription::Subscription;

use crate::hooks::{HookRunner, NoHooks};
use crate::manifest::{Manifest, Mode, TreeWalker};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, watch};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Default grace period before a failing job gives up.
pub const DEFAULT_FAIL_AFTER: Duration = Duration::from_secs(20);

/// Default pause between a failure and the next attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Not yet subscribed, or recovering from a failure.
    WillRun = 0,
    /// Subscribed and regenerating on change.
    Running = 1,
    /// Gave up. Only a new job can take over.
    Failed = 2,
    /// Shut down on request.
    Stopped = 3,
}

impl Status {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Failed,
            3 => Self::Stopped,
            _ => Self::WillRun,
        }
    }

    /// Returns true once the job's loop has exited for good.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WillRun => "will run",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        })
    }
}

/// Timing knobs of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// How long a job may keep failing, measured from its last success.
    pub fail_after: Duration,
    /// Pause after each failure before trying again.
    pub retry_backoff: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            fail_after: DEFAULT_FAIL_AFTER,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Point-in-time view of a job for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchJobInfo {
    /// Manifest the job maintains.
    pub manifest_path: PathBuf,
    /// Recorded error messages, oldest first.
    pub errors: Vec<String>,
    /// Capitalised mode name.
    pub mode: String,
}

/// One regeneration of a manifest.
///
/// Runs on a blocking thread. Implemented for closures, which is handy in tests.
pub trait Regenerate: Send + Sync + 'static {
    /// Regenerates the manifest.
    ///
    /// # Errors
    ///
    /// Returns any error that should count as a failed cycle.
    fn regenerate(&self) -> Result<()>;
}

impl<F> Regenerate for F
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    fn regenerate(&self) -> Result<()> {
        self()
    }
}

/// The default cycle: pre-hooks, walk and append, post-hooks.
pub struct ManifestRegenerator {
    manifest_path: PathBuf,
    scan_path: PathBuf,
    mode: Mode,
    append: bool,
    hooks: Arc<dyn HookRunner>,
}

impl ManifestRegenerator {
    /// Creates a regenerator. Manifests are appended to unless told otherwise.
    #[must_use]
    pub fn new(manifest_path: &Path, scan_path: &Path, mode: Mode, hooks: Arc<dyn HookRunner>) -> Self {
        Self {
            manifest_path: manifest_path.to_path_buf(),
            scan_path: scan_path.to_path_buf(),
            mode,
            append: true,
            hooks,
        }
    }

    /// Whether to keep existing manifest content.
    #[must_use]
    pub const fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    fn write_manifest(&self) -> Result<()> {
        let mut manifest = Manifest::open(&self.manifest_path, self.mode, self.append)?;
        let entries = TreeWalker::new(&self.scan_path, self.mode)
            .skip_path(&self.manifest_path)
            .walk()?;
        manifest.write_entries(&self.scan_path, &entries)?;
        manifest.close()
    }
}

impl Regenerate for ManifestRegenerator {
    fn regenerate(&self) -> Result<()> {
        if let Err(e) = self.hooks.run_pre_hooks() {
            error!(manifest = %self.manifest_path.display(), "One of the pre-hooks failed: {e:#}");
        }

        let result = self.write_manifest();

        if let Err(e) = self.hooks.run_post_hooks() {
            error!(manifest = %self.manifest_path.display(), "One of the post-hooks failed: {e:#}");
        }
        result
    }
}

/// What to do after a failure.
enum Recovery {
    Retry,
    Stopped,
    Failed(anyhow::Error),
}

/// Keeps one manifest in sync with its scan path.
///
/// All methods take `&self`, so a job is usually shared as `Arc<WatchJob>`
/// between the task running it and whoever reports on it.
pub struct WatchJob {
    manifest_path: PathBuf,
    scan_path: PathBuf,
    mode: Mode,
    options: WatchOptions,
    status: AtomicU8,
    errors: ErrorRing,
    shutdown: watch::Sender<bool>,
    /// True while [`run`](WatchJob::run) is executing.
    active: watch::Sender<bool>,
    trigger: Notify,
    regenerator: Arc<dyn Regenerate>,
}

/// Clears the active flag when `run` returns or its future is dropped.
struct ActiveGuard<'a>(&'a watch::Sender<bool>);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl WatchJob {
    /// Creates a job that regenerates by walking `scan_path`, running `hooks`
    /// around every cycle.
    #[must_use]
    pub fn new(manifest_path: &Path, scan_path: &Path, mode: Mode, hooks: Arc<dyn HookRunner>) -> Self {
        let regenerator = ManifestRegenerator::new(manifest_path, scan_path, mode, hooks);
        Self::with_regenerator(manifest_path, scan_path, mode, Arc::new(regenerator))
    }

    /// Creates a job without hooks.
    #[must_use]
    pub fn without_hooks(manifest_path: &Path, scan_path: &Path, mode: Mode) -> Self {
        Self::new(manifest_path, scan_path, mode, Arc::new(NoHooks))
    }

    /// Creates a job with a custom regeneration step.
    #[must_use]
    pub fn with_regenerator(
        manifest_path: &Path,
        scan_path: &Path,
        mode: Mode,
        regenerator: Arc<dyn Regenerate>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (active, _) = watch::channel(false);
        Self {
            manifest_path: manifest_path.to_path_buf(),
            scan_path: scan_path.to_path_buf(),
            mode,
            options: WatchOptions::default(),
            status: AtomicU8::new(Status::WillRun as u8),
            errors: ErrorRing::new(),
            shutdown,
            active,
            trigger: Notify::new(),
            regenerator,
        }
    }

    /// Replaces the timing options.
    #[must_use]
    pub const fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Directory being watched.
    #[must_use]
    pub fn scan_path(&self) -> &Path {
        &self.scan_path
    }

    /// Manifest being maintained.
    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Interpretation of the manifest.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Timing options in effect.
    #[must_use]
    pub const fn options(&self) -> WatchOptions {
        self.options
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Snapshot for status reporting.
    #[must_use]
    pub fn info(&self) -> WatchJobInfo {
        WatchJobInfo {
            manifest_path: self.manifest_path.clone(),
            errors: self.errors.snapshot(),
            mode: self.mode.title().to_string(),
        }
    }

    /// Asks the running loop to stop and marks the job stopped. Does not wait
    /// for the loop to exit. A failed job keeps its status.
    ///
    /// # Errors
    ///
    /// Never fails; the signature leaves room for jobs that own external
    /// resources.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown.send_replace(true);
        let _ = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != Status::Failed as u8).then_some(Status::Stopped as u8)
            });
        Ok(())
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once the job is not running, for example after a
    /// [`shutdown`](Self::shutdown) once its current cycle has finished and
    /// the manifest lock is released. Resolves at once for a job that never
    /// ran.
    pub async fn wait_idle(&self) {
        let mut active = self.active.subscribe();
        let _ = active.wait_for(|running| !*running).await;
    }

    /// Requests a regeneration as if a change had been observed.
    ///
    /// Requests made while a cycle is running are merged into one.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Records an error message, prefixed with `watch: `.
    pub fn record_error(&self, err: &anyhow::Error) {
        let message = format!("watch: {err:#}");
        error!(manifest = %self.manifest_path.display(), "{message}");
        self.errors.push(message);
    }

    fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    async fn cycle(&self) -> Result<()> {
        let regenerator = Arc::clone(&self.regenerator);
        tokio::task::spawn_blocking(move || regenerator.regenerate())
            .await
            .context("Regeneration task panicked")?
    }

    /// Runs the job until it is shut down or gives up.
    ///
    /// The initial generation has no grace period: if it fails the job is
    /// marked failed straight away. A job shut down before it started returns
    /// without generating.
    ///
    /// # Errors
    ///
    /// Returns the error that made the job give up.
    pub async fn run(&self) -> Result<()> {
        self.active.send_replace(true);
        let _active = ActiveGuard(&self.active);
        if self.is_shutdown() {
            self.set_status(Status::Stopped);
            return Ok(());
        }

        let span = info_span!("watch_job", manifest = %self.manifest_path.display());
        self.run_loop().instrument(span).await
    }

    async fn run_loop(&self) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();

        if let Err(e) = self.cycle().await {
            self.record_error(&e);
            self.set_status(Status::Failed);
            return Err(e);
        }
        let mut last_success = Instant::now();
        info!(scan_path = %self.scan_path.display(), mode = %self.mode, "Initial manifest generated");

        loop {
            if self.is_shutdown() {
                self.set_status(Status::Stopped);
                return Ok(());
            }

            let mut subscription =
                match Subscription::start(&self.scan_path, &self.manifest_path).await {
                    Ok(subscription) => subscription,
                    Err(e) => match self.recover(e, last_success, &mut shutdown).await {
                        Recovery::Retry => continue,
                        Recovery::Stopped => return Ok(()),
                        Recovery::Failed(e) => return Err(e),
                    },
                };
            self.set_status(Status::Running);
            debug!("Subscribed to changes");

            let (events, errors) = subscription.channels();
            let failure = loop {
                let outcome = tokio::select! {
                    _ = shutdown.changed() => None,
                    () = self.trigger.notified() => {
                        debug!("Regeneration requested");
                        Some(self.cycle().await)
                    }
                    Some(path) = events.recv() => {
                        debug!(path = %path.display(), "Event received");
                        Some(self.cycle().await)
                    }
                    Some(e) = errors.recv() => Some(Err(e)),
                };

                match outcome {
                    None => {
                        self.set_status(Status::Stopped);
                        info!("Watch job stopped");
                        return Ok(());
                    }
                    Some(Ok(())) => last_success = Instant::now(),
                    Some(Err(e)) => break e,
                }
            };

            drop(subscription);
            match self.recover(failure, last_success, &mut shutdown).await {
                Recovery::Retry => {}
                Recovery::Stopped => return Ok(()),
                Recovery::Failed(e) => return Err(e),
            }
        }
    }

    /// Records a failure, waits out the backoff and decides whether to retry.
    async fn recover(
        &self,
        err: anyhow::Error,
        last_success: Instant,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Recovery {
        self.record_error(&err);
        self.set_status(Status::WillRun);

        tokio::select! {
            () = tokio::time::sleep(self.options.retry_backoff) => {}
            _ = shutdown.changed() => {
                self.set_status(Status::Stopped);
                return Recovery::Stopped;
            }
        }

        if last_success.elapsed() >= self.options.fail_after {
            warn!(
                fail_after = %crate::utils::format_duration(self.options.fail_after),
                "Giving up after repeated failures"
            );
            self.set_status(Status::Failed);
            return Recovery::Failed(err);
        }

        info!(
            backoff = %crate::utils::format_duration(self.options.retry_backoff),
            "Retrying"
        );
        Recovery::Retry
    }
}

impl fmt::Debug for WatchJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchJob")
            .field("manifest_path", &self.manifest_path)
            .field("scan_path", &self.scan_path)
            .field("mode", &self.mode)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
