//! The pipeline worker: executes one job against the store.
//!
//! The worker owns the per-job store interaction and nothing else: it
//! drives the scraping strategy, applies each progress event to the store
//! in emission order, and reports progress and errors through callbacks.
//! It never mutates job state directly; the manager owns that.
//!
//! Per-event contract:
//!
//! - cancellation observed → the job dies with a cancellation error;
//! - `deleted` with a page id → delete the page; a store failure here is
//!   fatal to the job;
//! - no result with a page id → the page is unchanged (304), no store work;
//! - a result with a page id → delete the old page, then insert the new
//!   content (order enforced); the delete failing is fatal exactly like the
//!   `deleted` branch (an already-missing row is tolerated);
//! - a result without a page id → plain insert;
//! - insert failures are the one non-fatal case: reported, and the job
//!   continues.
//!
//! Every store error reported through the callbacks carries the offending
//! page id and URL.

use crate::scraper::WebScraperStrategy;
use crate::store::Store;
use crate::types::{ProgressEvent, ScrapeResult, ScraperOptions};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Progress/error callbacks the manager wires into a job run.
pub struct JobCallbacks {
    /// Invoked after the store work for each progress event.
    pub on_progress: Box<dyn Fn(&ProgressEvent) + Send + Sync>,
    /// Invoked when a store operation fails for one page.
    pub on_error: Box<dyn Fn(&Error, Option<&ScrapeResult>) + Send + Sync>,
}

/// Buffered progress events between strategy and worker.
const PROGRESS_BUFFER: usize = 32;

/// Executes one job: scrape, write through the store, report progress.
pub async fn execute_job(
    library: &str,
    version: Option<&str>,
    options: &ScraperOptions,
    store: &Arc<Store>,
    strategy: &WebScraperStrategy,
    callbacks: &JobCallbacks,
    cancel: &CancellationToken,
) -> Result<()> {
    // A full (non-refresh) index rebuilds the version from scratch.
    if !options.is_refresh {
        let removed = store.remove_all_documents(library, version)?;
        if removed > 0 {
            debug!(library, ?version, removed, "cleared existing documents");
        }
    }

    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(PROGRESS_BUFFER);

    let scrape = async {
        let result = strategy.scrape(options, &tx, cancel).await;
        drop(tx);
        result
    };

    let consume = async {
        while let Some(event) = rx.recv().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(
                    "Job cancelled during scraping progress".to_string(),
                ));
            }

            if event.deleted {
                if let Some(page_id) = event.page_id {
                    if let Err(err) = store.delete_page(page_id) {
                        // A failed deletion desynchronizes the refresh; the
                        // job cannot continue.
                        let err = page_error(page_id, &event.current_url, &err);
                        (callbacks.on_error)(&err, None);
                        return Err(err);
                    }
                }
            } else if let Some(result) = &event.result {
                if let Some(page_id) = event.page_id {
                    // Replace path: the old page goes before the new content
                    // lands. A row that is already gone is fine; any other
                    // delete failure is fatal, same as the deleted branch.
                    match store.delete_page(page_id) {
                        Ok(()) | Err(Error::NotFound(_)) => {},
                        Err(err) => {
                            let err = page_error(page_id, &event.current_url, &err);
                            (callbacks.on_error)(&err, Some(result));
                            return Err(err);
                        },
                    }
                }
                match store
                    .add_scrape_result(library, version, event.depth, result, cancel)
                    .await
                {
                    Ok(_) => {},
                    Err(err) if err.is_cancelled() => return Err(err),
                    Err(err) => {
                        // Non-fatal: report, skip the page, keep the job
                        // alive.
                        warn!(url = %event.current_url, "page store failed: {err}");
                        (callbacks.on_error)(&err, Some(result));
                    },
                }
            }
            // `result == None` with a page id is a 304: no store action.

            (callbacks.on_progress)(&event);
        }
        Ok(())
    };

    let (scrape_result, consume_result) = tokio::join!(scrape, consume);
    consume_result?;
    scrape_result?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled("Job cancelled".to_string()));
    }
    Ok(())
}

/// Wraps a page-level store failure with the offending page id and URL.
fn page_error(page_id: i64, url: &str, err: &Error) -> Error {
    Error::Storage(format!("failed to delete page {page_id} ('{url}'): {err}"))
}
