//! The in-memory job record.

use crate::types::{JobStatus, ScraperOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of indexing work against `(library, version)`.
///
/// The manager owns the authoritative in-memory copy; status and progress
/// changes write through to the version row before the corresponding event
/// is emitted. Serializes losslessly (RFC3339 dates, explicit nulls) for
/// the remote contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Stable job id.
    pub id: String,
    /// Normalized library name.
    pub library: String,
    /// Normalized version; `None` is the unversioned entry.
    pub version: Option<String>,
    /// Current status.
    pub status: JobStatus,
    /// The options the job runs with.
    pub options: ScraperOptions,
    /// Failure detail once `Failed`.
    pub error: Option<String>,
    /// Count of transient per-page errors survived so far.
    pub error_count: u32,
    /// Pages processed so far.
    pub progress_pages: u32,
    /// Effective page budget.
    pub progress_max_pages: u32,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// Execution start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal-state time.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a queued job.
    #[must_use]
    pub fn new(id: String, library: String, version: Option<String>, options: ScraperOptions) -> Self {
        Self {
            id,
            library,
            version,
            status: JobStatus::Queued,
            options,
            error: None,
            error_count: 0,
            progress_pages: 0,
            progress_max_pages: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// The mutual-exclusion key: two jobs with the same key never run
    /// concurrently.
    #[must_use]
    pub fn exclusion_key(&self) -> (String, Option<String>) {
        (self.library.clone(), self.version.clone())
    }
}
