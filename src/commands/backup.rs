use crate::BacklistContext;
use crate::backup::BackupProvider;
use crate::output;
use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, IsTerminal, Write};

pub fn execute(ctx: &BacklistContext, name: &str) -> Result<()> {
    let entry = ctx.config.get_backup(name).with_context(|| {
        format!(
            "No backup named '{name}' in {}",
            ctx.config_path.display()
        )
    })?;
    let (backup, mut provider) = entry.to_backup()?;

    if provider.requires_interactive_password() {
        if ctx.non_interactive || !io::stdin().is_terminal() {
            bail!(
                "No password for repository {}: set restic.password or RESTIC_PASSWORD",
                provider.target_location()
            );
        }
        let password = prompt_password(provider.target_location())?;
        provider = provider.with_password(password);
    }

    let cache_dir = ctx.config.cache_dir()?;
    output::action(
        "Backing up",
        &format!("{} ({} path(s))", backup.name(), backup.paths().len()),
    );
    backup.run(&provider, &cache_dir)?;

    output::success(&format!("Backup '{name}' finished"));
    Ok(())
}

fn prompt_password(target: &str) -> Result<String> {
    eprint!("Enter password for the repository {target}: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
