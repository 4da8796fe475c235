use anyhow::{Context, Result};
use backlist::cli::{Cli, Commands};
use backlist::output::{self, Verbosity};
use backlist::{BacklistContext, commands, logging};
use clap::{CommandFactory, Parser};
use clap_complete::{Generator, generate};
use colored::Colorize;
use std::io;
use std::process;

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completion { shell } = cli.command {
        print_completions(shell, &mut Cli::command());
        return Ok(());
    }

    let ctx = BacklistContext::new(cli.config.as_deref())?;

    let level = if cli.verbose {
        output::set_verbosity(Verbosity::Verbose);
        "debug"
    } else if cli.quiet {
        output::set_verbosity(Verbosity::Quiet);
        "warn"
    } else {
        ctx.config.log.level.as_str()
    };
    logging::init(level)?;

    match cli.command {
        Commands::Generate {
            mode,
            output,
            append,
            roots,
        } => commands::generate::execute(mode, &output, append, &roots)?,
        Commands::Watch {
            mode,
            scan_path,
            fail_after,
            manifest,
        } => runtime()?.block_on(commands::watch::execute(
            mode,
            &manifest,
            scan_path.as_deref(),
            fail_after,
        ))?,
        Commands::Run { json } => runtime()?.block_on(commands::run::execute(&ctx, json))?,
        Commands::Backup { name } => commands::backup::execute(&ctx, &name)?,
        Commands::Completion { .. } => {}
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("backlist-watch")
        .build()
        .context("Failed to start async runtime")
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
