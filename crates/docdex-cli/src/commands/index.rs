//! `docdex index` and `docdex refresh`.

use super::AppContext;
use crate::cli::{IndexArgs, RefreshArgs};
use anyhow::Result;
use docdex_core::jobs::Event;
use docdex_core::types::ScraperOptions;

/// Indexes a URL into a library version and waits for completion.
pub async fn run(context: &AppContext, args: IndexArgs) -> Result<()> {
    let mut options = ScraperOptions::new(args.url, args.library.clone(), args.version.clone());
    options.max_pages = args.max_pages;
    options.max_depth = args.max_depth;
    options.max_concurrency = args.max_concurrency;
    options.scope = args.scope.into();
    options.scrape_mode = args.scrape_mode.into();
    options.follow_redirects = !args.no_follow_redirects;
    options.include_patterns = args.include_patterns;
    options.exclude_patterns = args.exclude_patterns;
    options.ignore_errors = !args.strict;

    let (dispatcher, events) = context.dispatcher().await?;
    let job = dispatcher.enqueue_scrape_job(options).await?;
    println!(
        "Indexing {}@{} (job {job})",
        args.library,
        args.version.as_deref().unwrap_or("unversioned")
    );

    watch(dispatcher.as_ref(), &events, &job).await
}

/// Refreshes an indexed version against its source.
pub async fn refresh(context: &AppContext, args: RefreshArgs) -> Result<()> {
    let (dispatcher, events) = context.dispatcher().await?;
    let job = dispatcher
        .enqueue_refresh_job(&args.library, args.version.as_deref())
        .await?;
    println!(
        "Refreshing {}@{} (job {job})",
        args.library,
        args.version.as_deref().unwrap_or("unversioned")
    );

    watch(dispatcher.as_ref(), &events, &job).await
}

/// Prints page-level progress until the job reaches a terminal state.
async fn watch(
    dispatcher: &dyn docdex_core::JobDispatch,
    events: &docdex_core::EventBus,
    job: &str,
) -> Result<()> {
    let mut receiver = events.subscribe();
    let wait = dispatcher.wait_for_job_completion(job);
    tokio::pin!(wait);

    loop {
        tokio::select! {
            status = &mut wait => {
                let status = status?;
                println!("Job {job} {status:?}");
                return Ok(());
            },
            event = receiver.recv() => {
                if let Ok(Event::JobProgress { job_id, progress }) = event {
                    if job_id == job {
                        println!(
                            "  [{}/{}] {}",
                            progress.pages_scraped, progress.total_pages, progress.current_url
                        );
                    }
                }
            },
        }
    }
}
