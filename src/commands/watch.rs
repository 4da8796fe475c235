use crate::manifest::Mode;
use crate::output;
use crate::utils::paths::make_absolute;
use crate::watch::{WatchJob, WatchOptions};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Runs one watch job in the foreground until it fails or Ctrl-C arrives.
///
/// # Errors
///
/// Returns the job's error if it gave up, or an error setting it up.
pub async fn execute(
    mode: Mode,
    manifest: &Path,
    scan_path: Option<&Path>,
    fail_after: Option<Duration>,
) -> Result<()> {
    let manifest = make_absolute(manifest)?;
    let scan = match scan_path {
        Some(scan) => make_absolute(scan)?,
        None => manifest
            .parent()
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf),
    };

    let mut options = WatchOptions::default();
    if let Some(fail_after) = fail_after {
        options.fail_after = fail_after;
    }

    let job = Arc::new(WatchJob::without_hooks(&manifest, &scan, mode).with_options(options));
    output::action(
        "Watching",
        &format!("{} -> {}", scan.display(), manifest.display()),
    );

    let task_job = Arc::clone(&job);
    let mut task = tokio::spawn(async move { task_job.run().await });

    let result = tokio::select! {
        joined = &mut task => joined.context("Watch task panicked")?,
        signal = super::interrupted() => {
            signal?;
            job.shutdown()?;
            task.await.context("Watch task panicked")?
        }
    };

    output::print_jobs(&[(job.status(), job.info())]);
    result
}
