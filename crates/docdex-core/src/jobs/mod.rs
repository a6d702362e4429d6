//! The ingestion pipeline: job manager, worker, events, and the remote
//! client mirroring the manager's contract.
//!
//! The [`PipelineManager`] owns the in-memory job table, a bounded worker
//! pool, per-job cancellation tokens, and the event bus. Every state
//! transition is written through to the version row before its
//! `JOB_STATUS_CHANGE` event is emitted, so consumers can treat the event
//! stream as a faithful log of persisted state. Jobs dequeue FIFO, and two
//! jobs against the same `(library, version)` never run concurrently.

pub mod events;
mod job;
pub mod remote;
mod worker;

pub use events::{Event, EventBus};
pub use job::Job;
pub use worker::{execute_job, JobCallbacks};

use crate::config::Config;
use crate::content::PipelineOptions;
use crate::scraper::{canonicalize, WebScraperStrategy};
use crate::store::Store;
use crate::types::{
    normalize_library_name, normalize_version, JobStatus, PageSeed, ScraperOptions, VersionStatus,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The externally visible contract of the pipeline manager.
///
/// Implemented by the embedded [`PipelineManager`] and by
/// [`remote::RemoteClient`], so callers are transport-agnostic.
#[async_trait]
pub trait JobDispatch: Send + Sync {
    /// Enqueues a scrape job, creating or updating the version row.
    async fn enqueue_scrape_job(&self, options: ScraperOptions) -> Result<String>;

    /// Enqueues a refresh job seeded from the stored pages of an existing
    /// version.
    async fn enqueue_refresh_job(&self, library: &str, version: Option<&str>) -> Result<String>;

    /// Looks up one job.
    async fn get_job(&self, id: &str) -> Result<Option<Job>>;

    /// Lists jobs, optionally filtered by status.
    async fn get_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>>;

    /// Requests cancellation of a job.
    async fn cancel_job(&self, id: &str) -> Result<()>;

    /// Drops terminal jobs from memory, returning how many were removed.
    async fn clear_completed_jobs(&self) -> Result<usize>;

    /// Resolves once the job reaches a terminal state; a failed job yields
    /// its error.
    async fn wait_for_job_completion(&self, id: &str) -> Result<JobStatus>;
}

type ExclusionKey = (String, Option<String>);

struct ManagerInner {
    store: Arc<Store>,
    events: EventBus,
    strategy: WebScraperStrategy,
    jobs: Mutex<HashMap<String, Job>>,
    cancels: Mutex<HashMap<String, CancellationToken>>,
    key_locks: Mutex<HashMap<ExclusionKey, Arc<tokio::sync::Mutex<()>>>>,
    semaphore: Arc<Semaphore>,
}

impl ManagerInner {
    fn key_lock(&self, key: &ExclusionKey) -> Arc<tokio::sync::Mutex<()>> {
        #[allow(clippy::unwrap_used)]
        let mut locks = self.key_locks.lock().unwrap();
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    #[allow(clippy::unwrap_used)]
    fn job_snapshot(&self, id: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(id).cloned()
    }

    /// Applies a monotonic status transition: in-memory update, write
    /// through to the version row, then exactly one event.
    #[allow(clippy::unwrap_used)]
    fn transition(&self, id: &str, status: JobStatus, error: Option<String>) {
        let snapshot = {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(id) else { return };
            if job.status.is_terminal() {
                return;
            }
            job.status = status;
            match status {
                JobStatus::Running => job.started_at = Some(chrono::Utc::now()),
                _ if status.is_terminal() => {
                    job.finished_at = Some(chrono::Utc::now());
                    job.error = error.clone();
                },
                _ => {},
            }
            job.clone()
        };

        let version_status = if status == JobStatus::Running && snapshot.options.is_refresh {
            VersionStatus::Updating
        } else {
            status.as_version_status()
        };
        if let Err(err) = self.store.update_version_status(
            &snapshot.library,
            snapshot.version.as_deref(),
            version_status,
            error.as_deref(),
        ) {
            warn!(job = id, "failed to persist status transition: {err}");
        }

        self.events.emit(Event::JobStatusChange {
            id: snapshot.id,
            library: snapshot.library,
            version: snapshot.version,
            status,
            error,
        });
    }
}

/// Embedded job manager.
pub struct PipelineManager {
    inner: Arc<ManagerInner>,
}

impl PipelineManager {
    /// Creates a manager over a store with the configured concurrency.
    pub fn new(store: Arc<Store>, events: EventBus, config: &Config) -> Result<Self> {
        let strategy = WebScraperStrategy::new(PipelineOptions {
            chunk_sizes: config.chunk_sizes,
        })?
        .with_fetch_timeout(config.fetch.timeout());
        Ok(Self {
            inner: Arc::new(ManagerInner {
                store,
                events,
                strategy,
                jobs: Mutex::new(HashMap::new()),
                cancels: Mutex::new(HashMap::new()),
                key_locks: Mutex::new(HashMap::new()),
                semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            }),
        })
    }

    /// The event bus this manager emits on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Recovers persisted job state after a restart.
    ///
    /// Versions left `running`/`updating` are re-queued from their stored
    /// options when recovery is enabled, otherwise marked failed with
    /// "interrupted". Versions left `queued` are always re-queued (failing
    /// those without stored options).
    pub async fn recover(&self, recover_running: bool) -> Result<usize> {
        let mut recovered = 0usize;

        let interrupted = self
            .inner
            .store
            .get_versions_by_status(&[VersionStatus::Running, VersionStatus::Updating])?;
        for record in interrupted {
            let options = self
                .inner
                .store
                .get_scraper_options(&record.library, record.version.as_deref())?;
            match options {
                Some(options) if recover_running => {
                    info!(library = %record.library, version = ?record.version, "re-queueing interrupted job");
                    self.enqueue(options).await?;
                    recovered += 1;
                },
                _ => {
                    self.inner.store.update_version_status(
                        &record.library,
                        record.version.as_deref(),
                        VersionStatus::Failed,
                        Some("interrupted"),
                    )?;
                    self.inner.events.emit(Event::JobStatusChange {
                        id: String::new(),
                        library: record.library.clone(),
                        version: record.version.clone(),
                        status: JobStatus::Failed,
                        error: Some("interrupted".to_string()),
                    });
                },
            }
        }

        let queued = self
            .inner
            .store
            .get_versions_by_status(&[VersionStatus::Queued])?;
        for record in queued {
            match self
                .inner
                .store
                .get_scraper_options(&record.library, record.version.as_deref())?
            {
                Some(options) => {
                    info!(library = %record.library, version = ?record.version, "re-queueing pending job");
                    self.enqueue(options).await?;
                    recovered += 1;
                },
                None => {
                    self.inner.store.update_version_status(
                        &record.library,
                        record.version.as_deref(),
                        VersionStatus::Failed,
                        Some("interrupted"),
                    )?;
                },
            }
        }
        Ok(recovered)
    }

    async fn enqueue(&self, options: ScraperOptions) -> Result<String> {
        let library = normalize_library_name(&options.library);
        let version = normalize_version(options.version.as_deref());

        // The canonical stored options never carry per-run state; refresh
        // jobs rebuild their seeds from the page table each time.
        let mut stored = options.clone();
        stored.is_refresh = false;
        stored.initial_queue.clear();
        self.inner
            .store
            .store_scraper_options(&options.library, version.as_deref(), &stored)?;

        let id = uuid::Uuid::new_v4().to_string();
        let job = Job::new(id.clone(), library, version, options);
        let cancel = CancellationToken::new();

        #[allow(clippy::unwrap_used)]
        {
            self.inner.jobs.lock().unwrap().insert(id.clone(), job);
            self.inner
                .cancels
                .lock()
                .unwrap()
                .insert(id.clone(), cancel);
        }

        self.inner.transition(&id, JobStatus::Queued, None);
        self.inner.events.emit(Event::LibraryChange);

        let inner = Arc::clone(&self.inner);
        let job_id = id.clone();
        tokio::spawn(async move {
            run_job(inner, job_id).await;
        });

        Ok(id)
    }
}

/// One job's lifecycle on the worker pool.
async fn run_job(inner: Arc<ManagerInner>, id: String) {
    // FIFO over the bounded pool; cancellation can strike while queued.
    let Ok(_permit) = Arc::clone(&inner.semaphore).acquire_owned().await else {
        return;
    };

    let Some(job) = inner.job_snapshot(&id) else {
        return;
    };
    if job.status.is_terminal() {
        return;
    }

    // No two jobs for the same (library, version) run concurrently.
    let key_lock = inner.key_lock(&job.exclusion_key());
    let _guard = key_lock.lock().await;

    let cancel = {
        #[allow(clippy::unwrap_used)]
        let cancels = inner.cancels.lock().unwrap();
        cancels.get(&id).cloned().unwrap_or_default()
    };
    if cancel.is_cancelled() {
        inner.transition(&id, JobStatus::Cancelled, None);
        return;
    }

    inner.transition(&id, JobStatus::Running, None);

    let progress_inner = Arc::clone(&inner);
    let progress_id = id.clone();
    let error_inner = Arc::clone(&inner);
    let error_id = id.clone();

    let callbacks = JobCallbacks {
        on_progress: Box::new(move |event| {
            let snapshot = {
                #[allow(clippy::unwrap_used)]
                let mut jobs = progress_inner.jobs.lock().unwrap();
                let Some(job) = jobs.get_mut(&progress_id) else {
                    return;
                };
                job.progress_pages = event.pages_scraped;
                job.progress_max_pages = event.total_pages;
                job.clone()
            };
            if let Err(err) = progress_inner.store.update_version_progress(
                &snapshot.library,
                snapshot.version.as_deref(),
                event.pages_scraped,
                event.total_pages,
            ) {
                warn!(job = %progress_id, "failed to persist progress: {err}");
            }
            // The event payload travels without the scrape result body.
            let mut transport = event.clone();
            transport.result = None;
            progress_inner.events.emit(Event::JobProgress {
                job_id: progress_id.clone(),
                progress: transport,
            });
        }),
        on_error: Box::new(move |err, result| {
            #[allow(clippy::unwrap_used)]
            let mut jobs = error_inner.jobs.lock().unwrap();
            if let Some(job) = jobs.get_mut(&error_id) {
                job.error_count += 1;
            }
            warn!(
                job = %error_id,
                url = result.map(|r| r.url.as_str()).unwrap_or("-"),
                "job error (non-fatal unless rethrown): {err}"
            );
        }),
    };

    let result = execute_job(
        &job.library,
        job.version.as_deref(),
        &job.options,
        &inner.store,
        &inner.strategy,
        &callbacks,
        &cancel,
    )
    .await;

    match result {
        Ok(()) => {
            debug!(job = %id, "job completed");
            inner.transition(&id, JobStatus::Completed, None);
        },
        Err(err) if err.is_cancelled() => {
            info!(job = %id, "job cancelled");
            inner.transition(&id, JobStatus::Cancelled, None);
        },
        Err(err) => {
            warn!(job = %id, "job failed: {err}");
            inner.transition(&id, JobStatus::Failed, Some(err.to_string()));
        },
    }
    inner.events.emit(Event::LibraryChange);
}

#[async_trait]
impl JobDispatch for PipelineManager {
    async fn enqueue_scrape_job(&self, options: ScraperOptions) -> Result<String> {
        self.enqueue(options).await
    }

    async fn enqueue_refresh_job(&self, library: &str, version: Option<&str>) -> Result<String> {
        let mut options = self
            .inner
            .store
            .get_scraper_options(library, version)?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no stored scraper options for {library}@{}",
                    version.unwrap_or("unversioned")
                ))
            })?;

        let pages = self.inner.store.get_pages(library, version)?;
        let root = canonicalize(&options.url)
            .ok_or_else(|| Error::InvalidUrl(format!("invalid stored root URL '{}'", options.url)))?;

        // Seed from the indexed pages, with the root pinned exactly once at
        // depth 0 (keeping its page identity when it was indexed).
        let mut root_seed = PageSeed {
            url: root.clone(),
            depth: 0,
            page_id: None,
            etag: None,
        };
        let mut seeds = Vec::with_capacity(pages.len());
        for page in pages {
            let canonical = canonicalize(&page.url).unwrap_or_else(|| page.url.clone());
            if canonical == root {
                root_seed.page_id = Some(page.id);
                root_seed.etag = page.etag;
            } else {
                seeds.push(PageSeed {
                    url: canonical,
                    depth: page.depth,
                    page_id: Some(page.id),
                    etag: page.etag,
                });
            }
        }
        let mut initial_queue = vec![root_seed];
        initial_queue.extend(seeds);

        options.is_refresh = true;
        options.initial_queue = initial_queue;
        self.enqueue(options).await
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.inner.job_snapshot(id))
    }

    async fn get_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        #[allow(clippy::unwrap_used)]
        let jobs = self.inner.jobs.lock().unwrap();
        let mut listed: Vec<Job> = jobs
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(listed)
    }

    async fn cancel_job(&self, id: &str) -> Result<()> {
        let token = {
            #[allow(clippy::unwrap_used)]
            let cancels = self.inner.cancels.lock().unwrap();
            cancels.get(id).cloned()
        };
        let Some(token) = token else {
            return Err(Error::NotFound(format!("job '{id}' does not exist")));
        };
        token.cancel();

        let Some(job) = self.inner.job_snapshot(id) else {
            return Err(Error::NotFound(format!("job '{id}' does not exist")));
        };
        match job.status {
            JobStatus::Queued => self.inner.transition(id, JobStatus::Cancelled, None),
            JobStatus::Running => self.inner.transition(id, JobStatus::Cancelling, None),
            _ => {},
        }
        Ok(())
    }

    async fn clear_completed_jobs(&self) -> Result<usize> {
        #[allow(clippy::unwrap_used)]
        let mut jobs = self.inner.jobs.lock().unwrap();
        let terminal: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &terminal {
            jobs.remove(id);
        }
        drop(jobs);
        #[allow(clippy::unwrap_used)]
        let mut cancels = self.inner.cancels.lock().unwrap();
        for id in &terminal {
            cancels.remove(id);
        }
        Ok(terminal.len())
    }

    async fn wait_for_job_completion(&self, id: &str) -> Result<JobStatus> {
        // Subscribe before the snapshot so no transition slips between.
        let mut receiver = self.inner.events.subscribe();

        let Some(job) = self.inner.job_snapshot(id) else {
            return Err(Error::NotFound(format!("job '{id}' does not exist")));
        };
        if job.status.is_terminal() {
            return finished(job.status, job.error);
        }

        loop {
            match receiver.recv().await {
                Ok(Event::JobStatusChange {
                    id: event_id,
                    status,
                    error,
                    ..
                }) if event_id == id && status.is_terminal() => {
                    return finished(status, error);
                },
                Ok(_) => {},
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    // Missed events; fall back to the job table.
                    if let Some(job) = self.inner.job_snapshot(id) {
                        if job.status.is_terminal() {
                            return finished(job.status, job.error);
                        }
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return Err(Error::Other("event bus closed".to_string()));
                },
            }
        }
    }
}

fn finished(status: JobStatus, error: Option<String>) -> Result<JobStatus> {
    if status == JobStatus::Failed {
        return Err(Error::Other(
            error.unwrap_or_else(|| "job failed".to_string()),
        ));
    }
    Ok(status)
}
