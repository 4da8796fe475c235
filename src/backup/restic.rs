use super::BackupProvider;
use crate::utils::paths::to_slash;
use anyhow::{Context, Result, bail};
use command_group::CommandGroup;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Environment variable restic reads the repository password from.
pub const RESTIC_PASSWORD_ENV: &str = "RESTIC_PASSWORD";

/// Backs up with the `restic` command line tool.
#[derive(Clone, Default)]
pub struct ResticProvider {
    repo: String,
    extra_args: String,
    password: Option<String>,
}

impl std::fmt::Debug for ResticProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResticProvider")
            .field("repo", &self.repo)
            .field("extra_args", &self.extra_args)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ResticProvider {
    /// Creates a provider for `repo`. An empty password counts as none.
    #[must_use]
    pub fn new(repo: &str, extra_args: &str, password: Option<String>) -> Self {
        Self {
            repo: repo.replace('\\', "/"),
            extra_args: extra_args.trim().to_string(),
            password: password.filter(|p| !p.is_empty()),
        }
    }

    /// Replaces the password, e.g. after prompting for it.
    #[must_use]
    pub fn with_password(mut self, password: String) -> Self {
        self.password = Some(password).filter(|p| !p.is_empty());
        self
    }

    /// Whether a password is available from config or the environment.
    #[must_use]
    pub fn password_is_set(&self) -> bool {
        self.password.is_some()
            || std::env::var_os(RESTIC_PASSWORD_ENV).is_some_and(|p| !p.is_empty())
    }

    /// Argument vector for `restic backup`, without the program name.
    ///
    /// # Errors
    ///
    /// Returns an error if the extra arguments are not valid shell words.
    pub fn backup_args(&self, manifest: &Path) -> Result<Vec<String>> {
        let mut args = vec!["-r".to_string(), self.repo.clone(), "backup".to_string()];
        if !self.extra_args.is_empty() {
            let extra = shell_words::split(&self.extra_args)
                .with_context(|| format!("Invalid restic extra_args: '{}'", self.extra_args))?;
            args.extend(extra);
        }
        args.push("--files-from".to_string());
        args.push(to_slash(manifest));
        Ok(args)
    }
}

impl BackupProvider for ResticProvider {
    fn target_location(&self) -> &str {
        &self.repo
    }

    fn backup_with_manifest(&self, manifest: &Path) -> Result<()> {
        let restic = which::which("restic").context("restic not found in PATH")?;
        let args = self.backup_args(manifest)?;

        info!(repo = %self.repo, manifest = %manifest.display(), "Running restic backup");
        debug!(args = ?args, "restic arguments");

        let mut command = Command::new(restic);
        command.args(&args);
        if let Some(password) = &self.password {
            command.env(RESTIC_PASSWORD_ENV, password);
        }

        let mut child = command.group_spawn().context("Failed to spawn restic")?;
        let status = child.wait().context("Failed to wait for restic")?;
        if !status.success() {
            bail!("restic exited with {status}");
        }
        Ok(())
    }

    fn requires_interactive_password(&self) -> bool {
        !self.password_is_set()
    }
}
