//! `docdex jobs` and `docdex cancel`.

use super::AppContext;
use crate::cli::{CancelArgs, JobsArgs};
use anyhow::Result;

/// Shows jobs: from the remote server when configured, otherwise the
/// persisted version statuses (a local CLI process has no long-lived job
/// table of its own).
pub async fn run(context: &AppContext, args: JobsArgs) -> Result<()> {
    if context.server.is_some() {
        let (dispatcher, _events) = context.dispatcher().await?;
        let jobs = dispatcher.get_jobs(None).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&jobs)?);
            return Ok(());
        }
        if jobs.is_empty() {
            println!("No jobs.");
            return Ok(());
        }
        for job in jobs {
            println!(
                "{} {}@{} {:?} [{}/{}]{}",
                job.id,
                job.library,
                job.version.as_deref().unwrap_or("unversioned"),
                job.status,
                job.progress_pages,
                job.progress_max_pages,
                job.error
                    .as_deref()
                    .map(|e| format!(" - {e}"))
                    .unwrap_or_default(),
            );
        }
        return Ok(());
    }

    let store = context.open_store()?;
    let libraries = store.list_libraries()?;
    let mut any = false;
    for library in &libraries {
        for version in &library.versions {
            any = true;
            println!(
                "{}@{}: {:?}{}",
                library.library,
                version.version.as_deref().unwrap_or("unversioned"),
                version.status,
                version
                    .error
                    .as_deref()
                    .map(|e| format!(" - {e}"))
                    .unwrap_or_default(),
            );
        }
    }
    if !any {
        println!("No jobs.");
    }
    Ok(())
}

/// Cancels a job on the remote server.
pub async fn cancel(context: &AppContext, args: CancelArgs) -> Result<()> {
    let (dispatcher, _events) = context.dispatcher().await?;
    dispatcher.cancel_job(&args.id).await?;
    println!("Cancellation requested for {}", args.id);
    Ok(())
}
