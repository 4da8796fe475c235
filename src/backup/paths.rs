use crate::utils::paths::{clean, expand_tilde};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// The checked set of paths one backup covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPaths {
    paths: Vec<PathBuf>,
}

impl BackupPaths {
    /// Resolves configured paths against an optional base directory.
    ///
    /// Trailing slashes are dropped and each path is joined onto `base`.
    /// Every resulting path must exist, and no path may equal or contain
    /// another one.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty entry, a missing path, a duplicate or a
    /// nested pair.
    pub fn resolve(base: Option<&Path>, paths: &[String]) -> Result<Self> {
        let base = match base {
            Some(base) if !base.as_os_str().is_empty() => {
                let base = clean(&expand_tilde(base)?);
                if !base.exists() {
                    bail!("Backup base does not exist: {}", base.display());
                }
                Some(base)
            }
            _ => None,
        };

        let mut resolved = Vec::with_capacity(paths.len());
        for path in paths {
            let trimmed = path.trim_end_matches('/');
            if trimmed.is_empty() {
                bail!("One of the backup paths is empty");
            }

            let path = expand_tilde(Path::new(trimmed))?;
            let path = match &base {
                Some(base) => clean(&base.join(path)),
                None => clean(&path),
            };
            if !path
                .try_exists()
                .with_context(|| format!("Failed to check {}", path.display()))?
            {
                bail!("Backup path does not exist: {}", path.display());
            }
            resolved.push(path);
        }

        check_collisions(&resolved)?;
        Ok(Self { paths: resolved })
    }

    /// The resolved paths, in configured order.
    #[must_use]
    pub fn as_slice(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Number of paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true if there are no paths.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn check_collisions(paths: &[PathBuf]) -> Result<()> {
    for (i, longer) in paths.iter().enumerate() {
        for (j, shorter) in paths.iter().enumerate() {
            if i == j {
                continue;
            }
            if longer == shorter {
                bail!("Duplicate path: {}", longer.display());
            }
            // Component-wise, so /data does not collide with /database.
            if longer.starts_with(shorter) {
                bail!(
                    "Path collision: {} collides with {}",
                    shorter.display(),
                    longer.display()
                );
            }
        }
    }
    Ok(())
}
