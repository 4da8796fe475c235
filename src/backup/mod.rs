//! One-shot backups driven by a generated manifest.
//!
//! A [`Backup`] resolves its configured paths, walks them into a truncated
//! restic-mode manifest in the cache directory and hands that file to a
//! [`BackupProvider`]. The manifest is removed again afterwards.

/// Path resolution and collision checks.
pub mod paths;
/// The restic provider.
pub mod restic;

pub use paths::BackupPaths;
pub use restic::ResticProvider;

use crate::manifest::{Mode, generate};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, info, span, warn};

/// A backup tool that consumes a list of files.
pub trait BackupProvider: Send + Sync {
    /// Where the backup ends up, for messages and prompts.
    fn target_location(&self) -> &str;

    /// Backs up every path listed in `manifest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup tool cannot be run or reports failure.
    fn backup_with_manifest(&self, manifest: &Path) -> Result<()>;

    /// Whether the user has to be asked for a password before running.
    fn requires_interactive_password(&self) -> bool {
        false
    }
}

/// A named set of paths to back up.
#[derive(Debug, Clone)]
pub struct Backup {
    name: String,
    paths: BackupPaths,
}

impl Backup {
    /// Creates a backup over already resolved paths.
    #[must_use]
    pub const fn new(name: String, paths: BackupPaths) -> Self {
        Self { name, paths }
    }

    /// Backup name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved paths.
    #[must_use]
    pub const fn paths(&self) -> &BackupPaths {
        &self.paths
    }

    /// Location of the manifest this backup writes under `cache_dir`.
    #[must_use]
    pub fn manifest_path(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(format!("{}.list", self.name))
    }

    /// Generates the manifest and runs the provider on it.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails, in which case the provider is not
    /// run, or if the provider fails.
    pub fn run(&self, provider: &dyn BackupProvider, cache_dir: &Path) -> Result<()> {
        let span = span!(Level::INFO, "backup", name = %self.name, target = provider.target_location());
        let _guard = span.enter();

        let manifest = self.manifest_path(cache_dir);
        let result = generate(&manifest, Mode::Restic, false, self.paths.as_slice())
            .with_context(|| format!("Failed to generate manifest for backup '{}'", self.name))
            .and_then(|added| {
                info!(entries = added, "Manifest ready");
                provider
                    .backup_with_manifest(&manifest)
                    .with_context(|| format!("Backup '{}' failed", self.name))
            });

        if manifest.exists()
            && let Err(e) = fs::remove_file(&manifest)
        {
            warn!(manifest = %manifest.display(), "Failed to remove manifest: {e}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Option<String>>,
        fail: bool,
    }

    impl BackupProvider for Recording {
        fn target_location(&self) -> &str {
            "memory"
        }

        fn backup_with_manifest(&self, manifest: &Path) -> Result<()> {
            *self.seen.lock().unwrap() = Some(fs::read_to_string(manifest)?);
            if self.fail {
                anyhow::bail!("provider refused");
            }
            Ok(())
        }
    }

    fn backup(temp: &TempDir) -> Result<Backup> {
        fs::create_dir_all(temp.path().join("src/docs"))?;
        fs::write(temp.path().join("src/docs/a.txt"), "")?;
        fs::write(temp.path().join("src/docs/b.log"), "")?;
        fs::write(temp.path().join("src/docs/.gitignore"), "*.log\n")?;
        let paths = BackupPaths::resolve(Some(&temp.path().join("src")), &["docs".to_string()])?;
        Ok(Backup::new("docs".to_string(), paths))
    }

    #[test]
    fn test_run_hands_manifest_to_provider() -> Result<()> {
        let temp = TempDir::new()?;
        let cache = temp.path().join("cache");
        let backup = backup(&temp)?;
        let provider = Recording::default();

        backup.run(&provider, &cache)?;

        let seen = provider.seen.lock().unwrap().clone().unwrap();
        let a = temp.path().join("src/docs/a.txt");
        assert!(seen.lines().any(|l| l == a.to_string_lossy()));
        assert!(!seen.contains("b.log"));
        assert!(!backup.manifest_path(&cache).exists());
        Ok(())
    }

    #[test]
    fn test_provider_failure_is_reported() -> Result<()> {
        let temp = TempDir::new()?;
        let cache = temp.path().join("cache");
        let backup = backup(&temp)?;
        let provider = Recording {
            fail: true,
            ..Recording::default()
        };

        let err = backup.run(&provider, &cache).unwrap_err();
        assert!(format!("{err:#}").contains("provider refused"));
        assert!(!backup.manifest_path(&cache).exists());
        Ok(())
    }

    #[test]
    fn test_generation_failure_skips_provider() -> Result<()> {
        let temp = TempDir::new()?;
        let backup = backup(&temp)?;
        fs::write(temp.path().join("src/docs/.gitignore"), "[broken\n")?;
        let provider = Recording::default();

        assert!(backup.run(&provider, &temp.path().join("cache")).is_err());
        assert!(provider.seen.lock().unwrap().is_none());
        Ok(())
    }

    #[test]
    fn test_manifest_path() {
        let paths = BackupPaths::resolve(None, &[]).unwrap();
        let backup = Backup::new("photos".to_string(), paths);
        assert_eq!(
            backup.manifest_path(Path::new("/cache")),
            PathBuf::from("/cache/photos.list")
        );
    }
}
