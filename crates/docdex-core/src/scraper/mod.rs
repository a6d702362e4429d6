//! The web scraping strategy: URL frontier, conditional fetching, and
//! progress reporting.
//!
//! One strategy run drives one job. URLs leave the frontier in breadth
//! (depth) order and are fetched in bounded-concurrency batches; discovered
//! links pass scope and pattern filters before entering the frontier.
//! Refresh jobs seed the frontier from the stored pages with their etags,
//! so unchanged pages come back as 304s and vanished pages as deletion
//! events.
//!
//! Progress flows through an `mpsc` channel as one [`ProgressEvent`] per
//! processed URL; the pipeline worker consumes the channel and performs all
//! store writes, keeping this module free of storage concerns.

mod filters;

pub use filters::{canonicalize, UrlFilter};

use crate::content::{select_pipeline, ContentPipeline, PipelineOptions};
use crate::fetcher::{select_fetcher, FetchOptions, Fetcher, FileFetcher, HttpFetcher};
use crate::types::{FetchStatus, PageSeed, ProgressEvent, ScrapeResult, ScraperOptions};
use crate::{Error, Result};
use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of processing one frontier entry.
enum UrlOutcome {
    /// Fetched and processed; carries the pipeline output.
    Page(Box<ScrapeResult>),
    /// Conditional fetch matched; nothing to do.
    NotModified,
    /// A previously indexed page returned 404.
    Deleted,
    /// Nothing indexable (fresh 404, unsupported source).
    Skipped,
}

/// Scraping strategy over the standard fetcher and pipeline sets.
pub struct WebScraperStrategy {
    fetchers: Vec<Box<dyn Fetcher>>,
    pipelines: Vec<Box<dyn ContentPipeline>>,
    pipeline_options: PipelineOptions,
    fetch_timeout: Option<std::time::Duration>,
}

impl WebScraperStrategy {
    /// Creates a strategy with the standard fetchers and pipelines.
    pub fn new(pipeline_options: PipelineOptions) -> Result<Self> {
        Ok(Self {
            fetchers: vec![Box::new(HttpFetcher::new()?), Box::new(FileFetcher::new())],
            pipelines: crate::content::standard_pipelines(),
            pipeline_options,
            fetch_timeout: None,
        })
    }

    /// Applies a per-request fetch timeout to every page fetch.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Runs the strategy for one job, emitting one progress event per
    /// processed URL on `progress`.
    pub async fn scrape(
        &self,
        options: &ScraperOptions,
        progress: &mpsc::Sender<ProgressEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let filter = UrlFilter::new(
            &options.url,
            options.scope,
            &options.include_patterns,
            &options.exclude_patterns,
        )?;

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<PageSeed> = VecDeque::new();

        if options.initial_queue.is_empty() {
            let root = canonicalize(&options.url)
                .ok_or_else(|| Error::InvalidUrl(format!("invalid root URL '{}'", options.url)))?;
            visited.insert(root.clone());
            queue.push_back(PageSeed {
                url: root,
                depth: 0,
                page_id: None,
                etag: None,
            });
        } else {
            for seed in &options.initial_queue {
                let Some(canonical) = canonicalize(&seed.url) else {
                    continue;
                };
                if visited.insert(canonical.clone()) {
                    queue.push_back(PageSeed {
                        url: canonical,
                        depth: seed.depth,
                        page_id: seed.page_id,
                        etag: seed.etag.clone(),
                    });
                }
            }
        }

        let mut total_discovered = u32::try_from(queue.len()).unwrap_or(u32::MAX);
        let mut pages_scraped: u32 = 0;

        while !queue.is_empty() && pages_scraped < options.max_pages {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled("scrape cancelled".to_string()));
            }

            let budget = (options.max_pages - pages_scraped).max(1) as usize;
            let batch_size = (options.max_concurrency.max(1) as usize)
                .min(budget)
                .min(queue.len());
            let batch: Vec<PageSeed> = queue.drain(..batch_size).collect();

            let outcomes = futures::future::join_all(
                batch
                    .iter()
                    .map(|seed| self.process_url(seed, options, cancel)),
            )
            .await;

            for (seed, outcome) in batch.iter().zip(outcomes) {
                let event_body = match outcome {
                    Ok(UrlOutcome::Page(result)) => {
                        pages_scraped += 1;
                        if seed.depth < options.max_depth {
                            for link in &result.links {
                                let Some(canonical) = canonicalize(link) else {
                                    continue;
                                };
                                if filter.admits(&canonical) && visited.insert(canonical.clone()) {
                                    total_discovered = total_discovered.saturating_add(1);
                                    queue.push_back(PageSeed {
                                        url: canonical,
                                        depth: seed.depth + 1,
                                        page_id: None,
                                        etag: None,
                                    });
                                }
                            }
                        }
                        Some((Some(*result), false))
                    },
                    Ok(UrlOutcome::NotModified) => {
                        pages_scraped += 1;
                        Some((None, false))
                    },
                    Ok(UrlOutcome::Deleted) => Some((None, true)),
                    Ok(UrlOutcome::Skipped) => None,
                    Err(err) if err.is_cancelled() => return Err(err),
                    Err(err) => {
                        if options.ignore_errors {
                            warn!(url = %seed.url, "page failed, continuing: {err}");
                            None
                        } else {
                            return Err(err);
                        }
                    },
                };

                if let Some((result, deleted)) = event_body {
                    let event = ProgressEvent {
                        pages_scraped,
                        total_pages: total_discovered.min(options.max_pages),
                        total_discovered,
                        current_url: seed.url.clone(),
                        depth: seed.depth,
                        max_depth: options.max_depth,
                        result,
                        page_id: seed.page_id,
                        deleted,
                    };
                    progress
                        .send(event)
                        .await
                        .map_err(|_| Error::Cancelled("progress channel closed".to_string()))?;
                }
            }
        }

        debug!(
            pages_scraped,
            total_discovered,
            root = %options.url,
            "scrape strategy finished"
        );
        Ok(())
    }

    async fn process_url(
        &self,
        seed: &PageSeed,
        options: &ScraperOptions,
        cancel: &CancellationToken,
    ) -> Result<UrlOutcome> {
        let Some(fetcher) = select_fetcher(&self.fetchers, &seed.url) else {
            debug!(url = %seed.url, "no fetcher for URL, skipping");
            return Ok(UrlOutcome::Skipped);
        };

        let fetch_options = FetchOptions {
            etag: seed.etag.clone(),
            follow_redirects: options.follow_redirects,
            headers: options.headers.clone(),
            timeout: self.fetch_timeout,
            cancel: cancel.clone(),
        };

        let raw = fetcher.fetch(&seed.url, &fetch_options).await?;

        match raw.status {
            FetchStatus::NotModified => Ok(UrlOutcome::NotModified),
            FetchStatus::NotFound => {
                if seed.page_id.is_some() {
                    Ok(UrlOutcome::Deleted)
                } else {
                    debug!(url = %seed.url, "fresh URL returned not-found, skipping");
                    Ok(UrlOutcome::Skipped)
                }
            },
            FetchStatus::Success => {
                let Some(pipeline) = select_pipeline(&self.pipelines, &raw.mime_type) else {
                    return Ok(UrlOutcome::Skipped);
                };
                let result = pipeline.process(&raw, &self.pipeline_options)?;
                Ok(UrlOutcome::Page(Box::new(result)))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    async fn run_scrape(options: ScraperOptions) -> (Vec<ProgressEvent>, Result<()>) {
        let strategy = WebScraperStrategy::new(PipelineOptions::default()).unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let run = async move {
            let result = strategy.scrape(&options, &tx, &cancel).await;
            drop(tx); // close the channel so the collector finishes
            result
        };
        let collect = async {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        };
        let (result, events) = tokio::join!(run, collect);
        (events, result)
    }

    #[tokio::test]
    async fn test_scrape_follows_links_within_scope() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("index.md"),
            "# Index\n\nSee [sub](sub.md).\n",
        )
        .unwrap();
        fs::write(dir.path().join("sub.md"), "# Sub\n\nLeaf.\n").unwrap();

        let options = ScraperOptions::new(
            file_url(&dir.path().join("index.md")),
            "lib-a",
            Some("1.0.0".to_string()),
        );
        let (events, result) = run_scrape(options).await;
        result.unwrap();

        assert_eq!(events.len(), 2);
        assert!(events[0].current_url.ends_with("index.md"));
        assert_eq!(events[0].depth, 0);
        assert!(events[1].current_url.ends_with("sub.md"));
        assert_eq!(events[1].depth, 1);
        assert!(events.iter().all(|e| e.result.is_some()));
        assert_eq!(events[1].pages_scraped, 2);
    }

    #[tokio::test]
    async fn test_max_depth_bounds_discovery() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "[b](b.md)\n").unwrap();
        fs::write(dir.path().join("b.md"), "[c](c.md)\n").unwrap();
        fs::write(dir.path().join("c.md"), "leaf\n").unwrap();

        let mut options =
            ScraperOptions::new(file_url(&dir.path().join("a.md")), "lib", None);
        options.max_depth = 1;
        let (events, result) = run_scrape(options).await;
        result.unwrap();

        // Depth 0 and 1 fetched; c.md (depth 2) never enters the frontier.
        assert_eq!(events.len(), 2);
        assert!(!events.iter().any(|e| e.current_url.ends_with("c.md")));
    }

    #[tokio::test]
    async fn test_max_pages_bounds_fetching() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("hub.md"),
            "[one](one.md) [two](two.md) [three](three.md)\n",
        )
        .unwrap();
        for name in ["one.md", "two.md", "three.md"] {
            fs::write(dir.path().join(name), "leaf\n").unwrap();
        }

        let mut options =
            ScraperOptions::new(file_url(&dir.path().join("hub.md")), "lib", None);
        options.max_pages = 2;
        let (events, result) = run_scrape(options).await;
        result.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_seeds_report_not_modified_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.md");
        fs::write(&kept, "# Kept\n").unwrap();

        // Fetch once to learn the real etag.
        let fetcher = FileFetcher::new();
        let raw = fetcher
            .fetch(&file_url(&kept), &FetchOptions::new())
            .await
            .unwrap();

        let mut options = ScraperOptions::new(file_url(&kept), "lib", None);
        options.is_refresh = true;
        options.initial_queue = vec![
            PageSeed {
                url: file_url(&kept),
                depth: 0,
                page_id: Some(11),
                etag: raw.etag,
            },
            PageSeed {
                url: file_url(&dir.path().join("gone.md")),
                depth: 1,
                page_id: Some(12),
                etag: Some("stale".to_string()),
            },
        ];

        let (events, result) = run_scrape(options).await;
        result.unwrap();

        let kept_event = events
            .iter()
            .find(|e| e.current_url.ends_with("kept.md"))
            .unwrap();
        assert!(kept_event.result.is_none());
        assert!(!kept_event.deleted);
        assert_eq!(kept_event.page_id, Some(11));

        let gone_event = events
            .iter()
            .find(|e| e.current_url.ends_with("gone.md"))
            .unwrap();
        assert!(gone_event.deleted);
        assert_eq!(gone_event.page_id, Some(12));
        assert!(gone_event.result.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_stops_frontier() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "[b](b.md)\n").unwrap();
        fs::write(dir.path().join("b.md"), "leaf\n").unwrap();

        let strategy = WebScraperStrategy::new(PipelineOptions::default()).unwrap();
        let options = ScraperOptions::new(file_url(&dir.path().join("a.md")), "lib", None);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = strategy.scrape(&options, &tx, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_exclude_pattern_blocks_links() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("index.md"),
            "[keep](keep.md) [old](deprecated/old.md)\n",
        )
        .unwrap();
        fs::write(dir.path().join("keep.md"), "kept\n").unwrap();
        fs::create_dir_all(dir.path().join("deprecated")).unwrap();
        fs::write(dir.path().join("deprecated/old.md"), "old\n").unwrap();

        let mut options =
            ScraperOptions::new(file_url(&dir.path().join("index.md")), "lib", None);
        options.exclude_patterns = vec!["**/deprecated/**".to_string()];
        let (events, result) = run_scrape(options).await;
        result.unwrap();
        assert_eq!(events.len(), 2);
        assert!(!events.iter().any(|e| e.current_url.contains("deprecated")));
    }
}
