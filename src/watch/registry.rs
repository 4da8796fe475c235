use super::{WatchJob, WatchJobInfo};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The set of live watch jobs, at most one per manifest path.
///
/// Every mutation goes through one lock. Jobs are shut down only after they
/// have been taken out of the map and the lock has been released, so a job's
/// own locking never nests inside the registry's.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<BTreeMap<PathBuf, Arc<WatchJob>>>,
}

impl JobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Arc<WatchJob>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a job, replacing and shutting down any job for the same manifest.
    pub fn insert(&self, job: WatchJob) -> Arc<WatchJob> {
        let job = Arc::new(job);
        self.replace(&job);
        job
    }

    /// Registers a job and runs it on the current tokio runtime.
    ///
    /// A replaced job is shut down first, and the new job only starts once
    /// the old one has finished its current cycle and released the manifest.
    pub fn start(&self, job: WatchJob) -> (Arc<WatchJob>, JoinHandle<Result<()>>) {
        let job = Arc::new(job);
        let replaced = self.replace(&job);

        let task_job = Arc::clone(&job);
        let handle = tokio::spawn(async move {
            if let Some(old) = replaced {
                debug!(manifest = %old.manifest_path().display(), "Waiting for replaced job to finish");
                old.wait_idle().await;
            }
            task_job.run().await
        });
        (job, handle)
    }

    /// Puts `job` in the map and shuts down the job it displaced, if any.
    fn replace(&self, job: &Arc<WatchJob>) -> Option<Arc<WatchJob>> {
        let replaced = self
            .lock()
            .insert(job.manifest_path().to_path_buf(), Arc::clone(job));

        if let Some(old) = &replaced {
            info!(manifest = %old.manifest_path().display(), "Replacing existing watch job");
            if let Err(e) = old.shutdown() {
                warn!(manifest = %old.manifest_path().display(), "Failed to shut down replaced job: {e:#}");
            }
        }
        replaced
    }

    /// Looks up the job maintaining `manifest`.
    #[must_use]
    pub fn get(&self, manifest: &Path) -> Option<Arc<WatchJob>> {
        self.lock().get(manifest).cloned()
    }

    /// Status snapshots of every job, ordered by manifest path.
    #[must_use]
    pub fn infos(&self) -> Vec<WatchJobInfo> {
        let jobs: Vec<Arc<WatchJob>> = self.lock().values().cloned().collect();
        jobs.iter().map(|job| job.info()).collect()
    }

    /// Handles of every job, ordered by manifest path.
    #[must_use]
    pub fn jobs(&self) -> Vec<Arc<WatchJob>> {
        self.lock().values().cloned().collect()
    }

    /// Removes and shuts down the jobs for the given manifests.
    ///
    /// Returns one message per manifest that had no job or failed to stop.
    pub fn stop<P: AsRef<Path>>(&self, manifests: &[P]) -> Vec<String> {
        let mut errors = Vec::new();
        let removed: Vec<Arc<WatchJob>> = {
            let mut jobs = self.lock();
            manifests
                .iter()
                .filter_map(|manifest| {
                    let manifest = manifest.as_ref();
                    let job = jobs.remove(manifest);
                    if job.is_none() {
                        errors.push(format!("no watch job for {}", manifest.display()));
                    }
                    job
                })
                .collect()
        };

        for job in removed {
            debug!(manifest = %job.manifest_path().display(), "Stopping watch job");
            if let Err(e) = job.shutdown() {
                errors.push(format!("{}: {e:#}", job.manifest_path().display()));
            }
        }
        errors
    }

    /// Removes and shuts down every job.
    pub fn shutdown_all(&self) {
        let jobs = std::mem::take(&mut *self.lock());
        for job in jobs.into_values() {
            if let Err(e) = job.shutdown() {
                warn!(manifest = %job.manifest_path().display(), "Failed to shut down job: {e:#}");
            }
        }
    }

    /// Number of registered jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no job is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
