use crate::BacklistContext;
use crate::output;
use crate::watch::JobRegistry;
use anyhow::Result;
use tracing::debug;

/// Starts every configured watch job, waits for Ctrl-C, reports and stops them.
///
/// # Errors
///
/// Returns an error if a configured job cannot be built. Jobs that fail
/// while running are reported in the table, not as an error.
pub async fn execute(ctx: &BacklistContext, json: bool) -> Result<()> {
    if ctx.config.watch.is_empty() {
        output::warning(&format!(
            "No watch jobs configured in {}",
            ctx.config_path.display()
        ));
        return Ok(());
    }

    let jobs = ctx
        .config
        .watch
        .iter()
        .map(crate::config::WatchConfig::to_job)
        .collect::<Result<Vec<_>>>()?;

    let registry = JobRegistry::new();
    let mut handles = Vec::with_capacity(jobs.len());
    for job in jobs {
        output::action(
            "Watching",
            &format!("{} ({})", job.manifest_path().display(), job.mode()),
        );
        let (_, handle) = registry.start(job);
        handles.push(handle);
    }
    output::info("Press Ctrl-C to stop");

    super::interrupted().await?;

    let report: Vec<_> = registry
        .jobs()
        .iter()
        .map(|job| (job.status(), job.info()))
        .collect();
    if json {
        output::print_jobs_json(&report)?;
    } else {
        output::print_jobs(&report);
    }

    registry.shutdown_all();
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Job ended with error: {e:#}"),
            Err(e) => output::error(&format!("Watch task panicked: {e}")),
        }
    }
    Ok(())
}
