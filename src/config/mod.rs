pub mod parser;

use crate::backup::{Backup, BackupPaths, ResticProvider};
use crate::hooks::CommandHooks;
use crate::manifest::Mode;
use crate::utils::paths::make_absolute;
use crate::watch::{ManifestRegenerator, WatchJob, WatchOptions};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "BACKLIST_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Long-running manifest jobs started by `backlist run`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watch: Vec<WatchConfig>,

    /// Named one-shot backups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backup: Vec<BackupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CoreConfig {
    /// Where backup manifests are written; defaults to the user cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerformanceConfig {
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchConfig {
    pub manifest: PathBuf,
    /// Defaults to the manifest's directory
    #[serde(default)]
    pub scan_path: Option<PathBuf>,
    pub mode: String,
    #[serde(default = "default_append")]
    pub append: bool,
    #[serde(default)]
    pub fail_after_secs: Option<u64>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default)]
    pub hooks: HooksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HooksConfig {
    #[serde(default)]
    pub pre: Vec<String>,
    #[serde(default)]
    pub post: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupConfig {
    pub name: String,
    /// Absolute directory the paths are relative to
    #[serde(default)]
    pub base: Option<PathBuf>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub restic: ResticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ResticConfig {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub extra_args: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
        }
    }
}

impl WatchConfig {
    /// Parsed mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the mode is not `restic` or `syncthing`.
    pub fn mode(&self) -> Result<Mode> {
        self.mode.parse()
    }

    /// Absolute manifest path.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn manifest_path(&self) -> Result<PathBuf> {
        make_absolute(&self.manifest)
    }

    /// Absolute scan path, falling back to the manifest's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn scan_path(&self) -> Result<PathBuf> {
        match &self.scan_path {
            Some(scan) => make_absolute(scan),
            None => {
                let manifest = self.manifest_path()?;
                Ok(manifest
                    .parent()
                    .map_or_else(|| PathBuf::from("/"), Path::to_path_buf))
            }
        }
    }

    /// Timing options, with defaults for whatever is not configured.
    #[must_use]
    pub fn options(&self) -> WatchOptions {
        let mut options = WatchOptions::default();
        if let Some(secs) = self.fail_after_secs {
            options.fail_after = Duration::from_secs(secs);
        }
        if let Some(ms) = self.retry_backoff_ms {
            options.retry_backoff = Duration::from_millis(ms);
        }
        options
    }

    /// Builds the job this entry describes.
    ///
    /// # Errors
    ///
    /// Returns an error if the mode is invalid or a path cannot be made absolute.
    pub fn to_job(&self) -> Result<WatchJob> {
        let mode = self.mode()?;
        let manifest = self.manifest_path()?;
        let scan = self.scan_path()?;

        let hooks = CommandHooks::new(
            self.hooks.pre.clone(),
            self.hooks.post.clone(),
            &manifest,
            mode,
        );
        let regenerator =
            ManifestRegenerator::new(&manifest, &scan, mode, Arc::new(hooks)).append(self.append);

        Ok(WatchJob::with_regenerator(&manifest, &scan, mode, Arc::new(regenerator))
            .with_options(self.options()))
    }
}

impl BackupConfig {
    /// Resolves the paths and builds the backup and its provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the paths do not resolve.
    pub fn to_backup(&self) -> Result<(Backup, ResticProvider)> {
        let paths = BackupPaths::resolve(self.base.as_deref(), &self.paths)
            .with_context(|| format!("Backup configuration '{}'", self.name))?;
        let provider = ResticProvider::new(
            &self.restic.repo,
            &self.restic.extra_args,
            self.restic.password.clone(),
        );
        Ok((Backup::new(self.name.clone(), paths), provider))
    }
}

impl Config {
    /// Resolves which configuration file to use: an explicit path, then
    /// `$BACKLIST_CONFIG`, then `~/.config/backlist/config.toml`.
    #[must_use]
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        default_config_path()
    }

    /// Load configuration from a file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot read or parse the configuration file
    /// - Configuration file contains invalid TOML
    /// - The configuration fails validation
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        parser::parse_config_file(path)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot write to the file
    /// - TOML serialization fails
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        let mut file = std::fs::File::create(path)?;
        file.write_all(toml_str.as_bytes())?;
        Ok(())
    }

    /// Looks up a backup by name.
    #[must_use]
    pub fn get_backup(&self, name: &str) -> Option<&BackupConfig> {
        self.backup.iter().find(|b| b.name == name)
    }

    /// Directory backup manifests are written to.
    ///
    /// # Errors
    ///
    /// Returns an error if no cache directory is configured and none can be
    /// determined for the user.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.core.cache_dir {
            Some(dir) => make_absolute(dir),
            None => dirs::cache_dir()
                .map(|dir| dir.join("backlist"))
                .context("Could not determine cache directory"),
        }
    }
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".config")
        .join("backlist")
        .join("config.toml")
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_append() -> bool {
    true
}

fn default_parallel_threads() -> usize {
    crate::utils::thread_pool::default_threads()
}
