//! Terminal output for the backlist CLI.
//!
//! Messages go to stderr, coloured by severity and filtered by a global
//! verbosity. Job status tables go to stdout so they can be piped.

use crate::watch::{Status, WatchJobInfo};
use colored::Colorize;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU8, Ordering};

/// Verbosity level for output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Suppress informational messages, show only warnings and errors.
    Quiet = 0,
    /// Default verbosity level, show all standard messages.
    Normal = 1,
    /// Show verbose debug messages in addition to standard output.
    Verbose = 2,
}

/// Global verbosity setting (default: Normal).
static VERBOSITY: AtomicU8 = AtomicU8::new(1);

/// Sets the global verbosity level for all output functions.
pub fn set_verbosity(level: Verbosity) {
    VERBOSITY.store(level as u8, Ordering::Relaxed);
}

/// Gets the current global verbosity level.
pub fn get_verbosity() -> Verbosity {
    match VERBOSITY.load(Ordering::Relaxed) {
        0 => Verbosity::Quiet,
        2 => Verbosity::Verbose,
        _ => Verbosity::Normal,
    }
}

/// Prints a success message in green (respects quiet mode).
pub fn success(message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{}", message.green());
}

/// Prints an error message in bold red (always shown).
pub fn error(message: &str) {
    eprintln!("{}", message.red().bold());
}

/// Prints a warning message in bold yellow (always shown).
pub fn warning(message: &str) {
    eprintln!("{}", message.yellow().bold());
}

/// Prints an informational message in dimmed color (respects quiet mode).
pub fn info(message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{}", message.dimmed());
}

/// Prints a verbose debug message (only in verbose mode).
pub fn verbose(message: &str) {
    if get_verbosity() != Verbosity::Verbose {
        return;
    }
    eprintln!("{}", message.dimmed());
}

/// Prints a git-style action message with dimmed verb and normal message.
pub fn action(verb: &str, message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{} {}", verb.dimmed().bold(), message);
}

/// Renders one block per job: status, mode and manifest, then its errors.
#[must_use]
pub fn format_jobs(jobs: &[(Status, WatchJobInfo)]) -> String {
    let mut out = String::new();
    for (status, info) in jobs {
        let status_text = match status {
            Status::Running => status.to_string().green(),
            Status::WillRun => status.to_string().yellow(),
            Status::Failed => status.to_string().red().bold(),
            Status::Stopped => status.to_string().dimmed(),
        };
        let _ = writeln!(
            out,
            "{:<10} {:<10} {}",
            status_text,
            info.mode,
            info.manifest_path.display()
        );
        for error in &info.errors {
            let _ = writeln!(out, "    {} {}", "error:".red(), error);
        }
    }
    out
}

/// Prints the job table to stdout, or a note when there are no jobs.
pub fn print_jobs(jobs: &[(Status, WatchJobInfo)]) {
    if jobs.is_empty() {
        info("No watch jobs");
        return;
    }
    print!("{}", format_jobs(jobs));
}

/// Prints the job infos as pretty JSON to stdout.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_jobs_json(jobs: &[(Status, WatchJobInfo)]) -> anyhow::Result<()> {
    let infos: Vec<&WatchJobInfo> = jobs.iter().map(|(_, info)| info).collect();
    println!("{}", serde_json::to_string_pretty(&infos)?);
    Ok(())
}
