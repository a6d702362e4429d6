//! Core data structures for the docdex indexing and retrieval system.
//!
//! This module defines the fundamental types used throughout docdex-core for
//! representing fetched content, structured chunks, scrape jobs, and search
//! results.
//!
//! ## Type Categories
//!
//! - **Fetching**: [`RawContent`], [`FetchStatus`]
//! - **Content Structure**: [`Chunk`], [`Section`], [`ChunkMetadata`]
//! - **Scraping**: [`ScraperOptions`], [`ScrapeResult`], [`ProgressEvent`], [`PageSeed`]
//! - **Job State**: [`JobStatus`], [`VersionStatus`]
//! - **Listing**: [`LibrarySummary`], [`VersionSummary`]
//!
//! ## Serialization
//!
//! Types that cross the RPC boundary or are persisted as JSON use camelCase
//! field names so that stored `scraper_options` and remote payloads stay
//! stable across versions. Timestamps serialize as RFC3339 via chrono.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome classification of a fetch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// The resource was fetched and `content` carries its bytes.
    Success,
    /// The conditional request matched; the resource is unchanged and
    /// `content` is empty.
    NotModified,
    /// The resource does not exist (HTTP 404 or ENOENT); `content` is empty.
    NotFound,
}

/// Raw bytes and transport metadata returned by a fetcher.
///
/// The fetcher layer does no decoding: `content` is exactly what the source
/// returned (after transport decompression), and `charset`/`encoding` carry
/// the declared metadata for the content pipelines to act on.
#[derive(Debug, Clone)]
pub struct RawContent {
    /// Raw response body. Empty for `NotModified` and `NotFound`.
    pub content: Vec<u8>,
    /// MIME type without parameters, e.g. `text/html`.
    pub mime_type: String,
    /// Declared character set from `Content-Type`, when present.
    pub charset: Option<String>,
    /// `Content-Encoding` header value, when present.
    pub encoding: Option<String>,
    /// The final source location: for HTTP this is the post-redirect URL.
    pub source: String,
    /// Entity tag for conditional refresh. Verbatim from the `ETag` header,
    /// or derived from mtime for file sources.
    pub etag: Option<String>,
    /// `Last-Modified` header value, when present.
    pub last_modified: Option<String>,
    /// Outcome classification.
    pub status: FetchStatus,
}

/// Position of a chunk within the document hierarchy.
///
/// `level` denotes conceptual depth (0 = document root / unstructured);
/// `path` is the navigational ancestry, e.g. `["Chapter", "Section"]` for
/// markdown, `["root", "users", "[0]", "name"]` for JSON, or
/// `["app.ts", "Service", "start"]` for source code. After greedy merging a
/// chunk's path length need not equal its level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Section {
    /// Conceptual depth of this chunk.
    pub level: u32,
    /// Hierarchical ancestry of this chunk.
    pub path: Vec<String>,
}

/// A unit of indexed content.
///
/// Splitters guarantee that concatenating a document's chunks in emission
/// order reconstructs the splitter input byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Content-type tags, e.g. `["markdown"]`, `["code"]`, `["json"]`.
    pub types: Vec<String>,
    /// The chunk text.
    pub content: String,
    /// Hierarchy position.
    pub section: Section,
}

impl Chunk {
    /// Creates a chunk with a single type tag.
    #[must_use]
    pub fn new(kind: &str, content: impl Into<String>, level: u32, path: Vec<String>) -> Self {
        Self {
            types: vec![kind.to_string()],
            content: content.into(),
            section: Section { level, path },
        }
    }
}

/// Chunk metadata as persisted in the `documents.metadata` JSON column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Conceptual depth.
    pub level: u32,
    /// Hierarchical ancestry.
    pub path: Vec<String>,
    /// Content-type tags.
    pub types: Vec<String>,
}

impl From<&Chunk> for ChunkMetadata {
    fn from(chunk: &Chunk) -> Self {
        Self {
            level: chunk.section.level,
            path: chunk.section.path.clone(),
            types: chunk.types.clone(),
        }
    }
}

/// URL scope restriction for link following.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeScope {
    /// Follow only links under the root URL's path prefix.
    #[default]
    Subpages,
    /// Follow links on the exact same host.
    Hostname,
    /// Follow links anywhere on the registrable domain.
    Domain,
}

/// Fetch engine selection for a job.
///
/// `Playwright` designates an external browser-based fetcher for JS-heavy
/// pages; its contract matches the HTTP fetcher. In this crate `Auto` and
/// `Playwright` resolve to the HTTP fetcher and the mode is carried as
/// configuration for external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    /// Plain HTTP fetching.
    Fetch,
    /// Browser-based fetching.
    Playwright,
    /// Choose automatically.
    #[default]
    Auto,
}

/// A pre-seeded entry of the scraper work queue.
///
/// Refresh jobs load one seed per existing page, carrying the stored etag so
/// unchanged pages short-circuit with `NotModified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSeed {
    /// Page URL.
    pub url: String,
    /// Link depth relative to the root (root = 0).
    pub depth: u32,
    /// Database id of the existing page row, when refreshing.
    #[serde(default)]
    pub page_id: Option<i64>,
    /// Stored etag for conditional fetching.
    #[serde(default)]
    pub etag: Option<String>,
}

fn default_max_pages() -> u32 {
    1000
}
fn default_max_depth() -> u32 {
    3
}
fn default_max_concurrency() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

/// Options controlling one scrape job.
///
/// Stored as JSON on the version row so refresh jobs can replay the original
/// configuration. Patterns wrapped in `/.../` are regular expressions,
/// anything else is a glob; exclude patterns take precedence over include
/// patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperOptions {
    /// Root URL to scrape.
    pub url: String,
    /// Library name the pages belong to.
    pub library: String,
    /// Version name; `None` indexes the unversioned entry.
    #[serde(default)]
    pub version: Option<String>,
    /// Upper bound on pages fetched in one job.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Upper bound on link depth from the root.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Parallel fetches within the job.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    /// Link-following scope.
    #[serde(default)]
    pub scope: ScrapeScope,
    /// Follow HTTP redirects. When `false` a 3xx surfaces a redirect error.
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    /// Fetch engine selection.
    #[serde(default)]
    pub scrape_mode: ScrapeMode,
    /// Only index URLs matching one of these patterns (all, when empty).
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Never index URLs matching one of these patterns.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Pre-seeded work queue, used by refresh jobs.
    #[serde(default)]
    pub initial_queue: Vec<PageSeed>,
    /// Refresh mode: keep existing pages, use conditional requests, handle
    /// 404s as deletions.
    #[serde(default)]
    pub is_refresh: bool,
    /// Record per-page errors and continue instead of failing the job.
    #[serde(default = "default_true")]
    pub ignore_errors: bool,
}

impl ScraperOptions {
    /// Creates options with defaults for everything but the target.
    #[must_use]
    pub fn new(url: impl Into<String>, library: impl Into<String>, version: Option<String>) -> Self {
        Self {
            url: url.into(),
            library: library.into(),
            version,
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            max_concurrency: default_max_concurrency(),
            scope: ScrapeScope::default(),
            follow_redirects: true,
            scrape_mode: ScrapeMode::default(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            headers: HashMap::new(),
            initial_queue: Vec::new(),
            is_refresh: false,
            ignore_errors: true,
        }
    }
}

/// Fully processed content of one page, ready for storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    /// Final page URL.
    pub url: String,
    /// Extracted title, when any middleware produced one.
    #[serde(default)]
    pub title: Option<String>,
    /// MIME type after pipeline transforms (HTML becomes `text/markdown`).
    pub content_type: String,
    /// Canonical text content after pipeline transforms.
    pub text_content: String,
    /// Absolute URLs discovered on the page.
    #[serde(default)]
    pub links: Vec<String>,
    /// Non-fatal errors collected while processing.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Hierarchical chunks.
    pub chunks: Vec<Chunk>,
    /// Entity tag for the fetched representation.
    #[serde(default)]
    pub etag: Option<String>,
    /// Last-Modified of the fetched representation.
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Progress report emitted once per processed URL.
///
/// Exactly one of the following shapes applies:
/// - `deleted == true` with `page_id`: the page vanished (404 on refresh);
/// - `result == None` with `page_id`: the page is unchanged (304);
/// - `result == Some` with `page_id`: an existing page changed;
/// - `result == Some` without `page_id`: a new page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Pages fetched so far in this job.
    pub pages_scraped: u32,
    /// Effective page budget (min of discovered and `max_pages`).
    pub total_pages: u32,
    /// Distinct URLs discovered so far.
    pub total_discovered: u32,
    /// URL this event reports on.
    pub current_url: String,
    /// Link depth of the current URL.
    pub depth: u32,
    /// Depth bound of the job.
    pub max_depth: u32,
    /// Processed content; `None` for 304s and deletions.
    #[serde(default)]
    pub result: Option<ScrapeResult>,
    /// Existing page row the event refers to, when known.
    #[serde(default)]
    pub page_id: Option<i64>,
    /// The page was deleted at the source.
    #[serde(default)]
    pub deleted: bool,
}

/// Indexing state of a version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Version exists but has never been indexed.
    NotIndexed,
    /// A job is queued for this version.
    Queued,
    /// A job is actively indexing this version.
    Running,
    /// A refresh job is updating this version in place.
    Updating,
    /// Last job finished successfully.
    Completed,
    /// Last job failed; `error_message` says why.
    Failed,
    /// Last job was cancelled.
    Cancelled,
}

impl VersionStatus {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotIndexed => "not_indexed",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Updating => "updating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_indexed" => Some(Self::NotIndexed),
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "updating" => Some(Self::Updating),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Lifecycle state of an in-memory job.
///
/// Transitions are monotonic: `Queued → Running → {Completed | Failed |
/// Cancelled}`, with `Cancelling` interposed when cancellation is requested
/// while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker slot.
    Queued,
    /// Executing.
    Running,
    /// Cancellation requested; the worker has not yet observed it.
    Cancelling,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The version-row status corresponding to this job status.
    #[must_use]
    pub const fn as_version_status(self) -> VersionStatus {
        match self {
            Self::Queued => VersionStatus::Queued,
            Self::Running | Self::Cancelling => VersionStatus::Running,
            Self::Completed => VersionStatus::Completed,
            Self::Failed => VersionStatus::Failed,
            Self::Cancelled => VersionStatus::Cancelled,
        }
    }
}

/// One version of a library, as listed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    /// Version name; `None` is the unversioned entry.
    pub version: Option<String>,
    /// Indexing state.
    pub status: VersionStatus,
    /// Indexed page count.
    pub pages: u32,
    /// Failure detail when `status == Failed`.
    #[serde(default)]
    pub error: Option<String>,
}

/// A library and its indexed versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySummary {
    /// Display name as first provided by a caller.
    pub library: String,
    /// All known versions, unversioned entry first.
    pub versions: Vec<VersionSummary>,
}

/// Normalizes a library name for storage and comparison.
///
/// Names are case-insensitively unique; the normalized (lowercased, trimmed)
/// form is the comparison key while the display name is stored verbatim.
#[must_use]
pub fn normalize_library_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalizes a version reference: empty and `"latest"` map to the
/// unversioned sentinel.
#[must_use]
pub fn normalize_version(version: Option<&str>) -> Option<String> {
    match version {
        None => None,
        Some(v) => {
            let trimmed = v.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("latest") {
                None
            } else {
                Some(trimmed.to_string())
            }
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scraper_options_defaults_from_minimal_json() {
        let options: ScraperOptions =
            serde_json::from_str(r#"{"url":"https://example.com/docs","library":"example"}"#)
                .unwrap();
        assert_eq!(options.max_pages, 1000);
        assert_eq!(options.max_depth, 3);
        assert_eq!(options.max_concurrency, 3);
        assert_eq!(options.scope, ScrapeScope::Subpages);
        assert!(options.follow_redirects);
        assert_eq!(options.scrape_mode, ScrapeMode::Auto);
        assert!(options.ignore_errors);
        assert!(!options.is_refresh);
        assert!(options.initial_queue.is_empty());
    }

    #[test]
    fn test_scraper_options_round_trip() {
        let mut options = ScraperOptions::new("file:///docs/index.md", "lib-a", None);
        options.initial_queue.push(PageSeed {
            url: "file:///docs/index.md".to_string(),
            depth: 0,
            page_id: Some(7),
            etag: Some("abc".to_string()),
        });
        options.is_refresh = true;
        let json = serde_json::to_string(&options).unwrap();
        let back: ScraperOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
        // Stored form uses camelCase keys for cross-process stability.
        assert!(json.contains("maxPages"));
        assert!(json.contains("initialQueue"));
    }

    #[test]
    fn test_job_status_terminality() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Cancelling.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_version_status_round_trip() {
        for status in [
            VersionStatus::NotIndexed,
            VersionStatus::Queued,
            VersionStatus::Running,
            VersionStatus::Updating,
            VersionStatus::Completed,
            VersionStatus::Failed,
            VersionStatus::Cancelled,
        ] {
            assert_eq!(VersionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(VersionStatus::parse("bogus"), None);
    }

    #[test]
    fn test_normalize_library_name() {
        assert_eq!(normalize_library_name("React"), "react");
        assert_eq!(normalize_library_name("  Vue "), "vue");
    }

    #[test]
    fn test_normalize_version_sentinels() {
        assert_eq!(normalize_version(None), None);
        assert_eq!(normalize_version(Some("")), None);
        assert_eq!(normalize_version(Some("  ")), None);
        assert_eq!(normalize_version(Some("latest")), None);
        assert_eq!(normalize_version(Some("1.2.3")), Some("1.2.3".to_string()));
    }

    #[test]
    fn test_chunk_metadata_from_chunk() {
        let chunk = Chunk::new("markdown", "body", 2, vec!["A".into(), "B".into()]);
        let meta = ChunkMetadata::from(&chunk);
        assert_eq!(meta.level, 2);
        assert_eq!(meta.path, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(meta.types, vec!["markdown".to_string()]);
    }
}
