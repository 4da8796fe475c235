//! Pre- and post-generation hooks.
//!
//! A [`HookRunner`] is handed to a watch job and called around every
//! regeneration. Hook failures are reported to the caller, which logs them;
//! they never stop a regeneration from happening.

use crate::manifest::Mode;
use anyhow::{Context, Result, bail};
use command_group::CommandGroup;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{Level, debug, span};

/// Environment variable telling a hook whether it runs before or after generation.
pub const HOOK_PHASE_ENV: &str = "BACKLIST_HOOK";
/// Environment variable holding the manifest path.
pub const HOOK_MANIFEST_ENV: &str = "BACKLIST_MANIFEST";
/// Environment variable holding the manifest mode.
pub const HOOK_MODE_ENV: &str = "BACKLIST_MODE";

/// Runs user hooks around a regeneration.
pub trait HookRunner: Send + Sync {
    /// Runs before the manifest is opened.
    ///
    /// # Errors
    ///
    /// Returns the first hook failure.
    fn run_pre_hooks(&self) -> Result<()>;

    /// Runs after the walk, whether or not it succeeded.
    ///
    /// # Errors
    ///
    /// Returns the first hook failure.
    fn run_post_hooks(&self) -> Result<()>;
}

/// A runner with nothing to run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl HookRunner for NoHooks {
    fn run_pre_hooks(&self) -> Result<()> {
        Ok(())
    }

    fn run_post_hooks(&self) -> Result<()> {
        Ok(())
    }
}

/// Which side of a regeneration a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Before the walk.
    Pre,
    /// After the walk.
    Post,
}

impl HookPhase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }
}

/// Runs configured shell-style command lines, one after another.
///
/// Each line is split with shell quoting rules and executed directly, without
/// a shell, in its own process group. The hook sees the phase, manifest path
/// and mode in its environment.
#[derive(Debug, Clone)]
pub struct CommandHooks {
    pre: Vec<String>,
    post: Vec<String>,
    manifest: PathBuf,
    mode: Mode,
}

impl CommandHooks {
    /// Creates a runner for the given command lines.
    #[must_use]
    pub fn new(pre: Vec<String>, post: Vec<String>, manifest: &Path, mode: Mode) -> Self {
        Self {
            pre,
            post,
            manifest: manifest.to_path_buf(),
            mode,
        }
    }

    fn run_phase(&self, phase: HookPhase, commands: &[String]) -> Result<()> {
        let span = span!(Level::DEBUG, "hooks", phase = phase.as_str(), count = commands.len());
        let _guard = span.enter();

        for cmd in commands {
            self.run_one(phase, cmd)
                .with_context(|| format!("{} hook failed: '{cmd}'", phase.as_str()))?;
        }
        Ok(())
    }

    fn run_one(&self, phase: HookPhase, cmd: &str) -> Result<()> {
        let parts = shell_words::split(cmd)
            .with_context(|| format!("Invalid hook command syntax: '{cmd}'"))?;
        let Some((program, args)) = parts.split_first() else {
            bail!("Empty hook command");
        };

        which::which(program)
            .with_context(|| format!("Hook program '{program}' not found in PATH"))?;

        debug!(program = %program, args = ?args, "Running hook");
        let mut child = Command::new(program)
            .args(args)
            .env(HOOK_PHASE_ENV, phase.as_str())
            .env(HOOK_MANIFEST_ENV, &self.manifest)
            .env(HOOK_MODE_ENV, self.mode.as_str())
            .group_spawn()
            .with_context(|| format!("Failed to spawn hook: {program}"))?;

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for hook: {program}"))?;
        if !status.success() {
            bail!("Hook exited with {status}");
        }
        Ok(())
    }
}

impl HookRunner for CommandHooks {
    fn run_pre_hooks(&self) -> Result<()> {
        self.run_phase(HookPhase::Pre, &self.pre)
    }

    fn run_post_hooks(&self) -> Result<()> {
        self.run_phase(HookPhase::Post, &self.post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn hooks(pre: &[&str], post: &[&str]) -> CommandHooks {
        CommandHooks::new(
            pre.iter().map(ToString::to_string).collect(),
            post.iter().map(ToString::to_string).collect(),
            Path::new("/tmp/manifest.list"),
            Mode::Restic,
        )
    }

    #[test]
    fn test_no_hooks() {
        assert!(NoHooks.run_pre_hooks().is_ok());
        assert!(NoHooks.run_post_hooks().is_ok());
    }

    #[test]
    fn test_empty_command_lists_succeed() {
        let runner = hooks(&[], &[]);
        assert!(runner.run_pre_hooks().is_ok());
        assert!(runner.run_post_hooks().is_ok());
    }

    #[test]
    fn test_successful_hook() {
        assert!(hooks(&["true"], &[]).run_pre_hooks().is_ok());
    }

    #[test]
    fn test_failing_hook_reports_error() {
        let err = hooks(&[], &["false"]).run_post_hooks().unwrap_err();
        assert!(format!("{err:#}").contains("post hook failed"));
    }

    #[test]
    fn test_first_failure_stops_phase() -> Result<()> {
        let temp = TempDir::new()?;
        let marker = temp.path().join("ran");
        let touch = format!("touch '{}'", marker.display());

        let result = hooks(&["false", &touch], &[]).run_pre_hooks();
        assert!(result.is_err());
        assert!(!marker.exists());
        Ok(())
    }

    #[test]
    fn test_missing_program() {
        let result = hooks(&["definitely-not-a-real-program-xyz"], &[]).run_pre_hooks();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_quoting() {
        assert!(hooks(&["echo 'unterminated"], &[]).run_pre_hooks().is_err());
    }

    #[test]
    fn test_hook_environment() -> Result<()> {
        let temp = TempDir::new()?;
        let out = temp.path().join("env");
        let script = format!(
            "sh -c 'echo \"$BACKLIST_HOOK $BACKLIST_MODE $BACKLIST_MANIFEST\" > \"{}\"'",
            out.display()
        );
        hooks(&[], &[&script]).run_post_hooks()?;
        assert_eq!(
            fs::read_to_string(&out)?.trim(),
            "post restic /tmp/manifest.list"
        );
        Ok(())
    }
}
