//! Embedded relational + vector store.
//!
//! One SQLite database holds the whole index: `libraries` → `versions` →
//! `pages` → `documents`, an FTS5 table over document content maintained by
//! triggers, and embedding vectors as little-endian `f32` BLOBs on the
//! document rows. The store is the sole writer; every mutation goes through
//! its methods and the internal connection lock serializes them.
//!
//! ## Migrations
//!
//! Schema migrations are sequentially numbered SQL files embedded at compile
//! time and applied on open inside a transaction each, with the installed
//! version tracked in `PRAGMA user_version`. Opening retries a bounded
//! number of times when another process holds the database busy.
//!
//! ## Concurrency
//!
//! SQLite runs in WAL mode: readers proceed concurrently with the single
//! writer. Embedding happens before the connection lock is taken, so slow
//! providers never hold up readers.

mod search;

pub use search::{FtsCandidate, VectorCandidate};

use crate::embedder::{vec_to_blob, Embedder};
use crate::types::{
    normalize_library_name, normalize_version, ChunkMetadata, LibrarySummary, ScrapeResult,
    ScraperOptions, VersionStatus, VersionSummary,
};
use crate::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sequentially numbered schema migrations, applied in order on open.
const MIGRATIONS: &[&str] = &[
    include_str!("migrations/0001_init.sql"),
    include_str!("migrations/0002_fts.sql"),
];

/// Attempts made to open/migrate a busy database before giving up.
const BUSY_ATTEMPTS: u32 = 3;

/// Store-side operations observable through the ordering probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// All chunks of a page were deleted.
    DeleteChunks,
    /// One chunk was inserted.
    InsertChunk,
    /// A page row (and its chunks) was deleted.
    DeletePage,
}

type Probe = Box<dyn Fn(StoreOp, i64) + Send + Sync>;

/// A version row as seen by the pipeline manager.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    /// Row id.
    pub id: i64,
    /// Normalized library name.
    pub library: String,
    /// Version name; `None` is the unversioned entry.
    pub version: Option<String>,
    /// Indexing status.
    pub status: VersionStatus,
    /// Root URL the version was indexed from.
    pub source_url: Option<String>,
    /// Failure detail, when failed.
    pub error_message: Option<String>,
}

/// A page row, as loaded for refresh seeding and retrieval assembly.
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// Row id.
    pub id: i64,
    /// Page URL, unique within its version.
    pub url: String,
    /// Extracted title.
    pub title: Option<String>,
    /// Stored etag for conditional refresh.
    pub etag: Option<String>,
    /// Link depth at index time.
    pub depth: u32,
    /// MIME type after pipeline transforms.
    pub content_type: Option<String>,
}

/// A chunk row, as loaded for retrieval.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    /// Row id; the FTS rowid and vector candidate id.
    pub id: i64,
    /// Owning page.
    pub page_id: i64,
    /// Chunk text.
    pub content: String,
    /// Hierarchy metadata.
    pub metadata: ChunkMetadata,
    /// Dense position within the page.
    pub sort_order: u32,
}

/// The embedded store.
pub struct Store {
    conn: Mutex<Connection>,
    embedder: Embedder,
    probe: Mutex<Option<Probe>>,
}

impl Store {
    /// Opens (creating if necessary) the database at `path` and applies
    /// pending migrations.
    pub fn open(path: &Path, embedder: Embedder) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create data directory: {e}")))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, embedder)
    }

    /// Opens an in-memory store. Used by tests and ephemeral indexing.
    pub fn open_in_memory(embedder: Embedder) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, embedder)
    }

    fn from_connection(conn: Connection, embedder: Embedder) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_millis(5000))?;

        let store = Self {
            conn: Mutex::new(conn),
            embedder,
            probe: Mutex::new(None),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Applies pending migrations with bounded retry on a busy database.
    fn migrate(&self) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_migrate() {
                Ok(applied) => {
                    if applied > 0 {
                        info!("Applied {applied} schema migration(s)");
                    }
                    return Ok(());
                },
                Err(err) if attempt < BUSY_ATTEMPTS && is_busy(&err) => {
                    warn!("Database busy during migration (attempt {attempt}), retrying");
                    std::thread::sleep(Duration::from_millis(200));
                },
                Err(err) => {
                    return Err(Error::Migration(format!(
                        "schema migration failed: {err}"
                    )));
                },
            }
        }
    }

    fn try_migrate(&self) -> Result<u32> {
        let conn = self.lock();
        let installed: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        let mut applied = 0u32;
        for (index, sql) in MIGRATIONS.iter().enumerate() {
            let target = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if target <= installed {
                continue;
            }
            conn.execute_batch(&format!(
                "BEGIN;\n{sql}\nPRAGMA user_version = {target};\nCOMMIT;"
            ))?;
            applied += 1;
        }
        Ok(applied)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        #[allow(clippy::unwrap_used)] // poisoned lock is unrecoverable
        self.conn.lock().unwrap()
    }

    fn emit_probe(&self, op: StoreOp, id: i64) {
        #[allow(clippy::unwrap_used)]
        if let Some(probe) = self.probe.lock().unwrap().as_ref() {
            probe(op, id);
        }
    }

    /// Installs an ordering probe observing chunk/page mutations. Tests use
    /// this to assert delete-before-insert ordering.
    pub fn set_probe(&self, probe: Probe) {
        #[allow(clippy::unwrap_used)]
        {
            *self.probe.lock().unwrap() = Some(probe);
        }
    }

    /// The embedder this store indexes with.
    #[must_use]
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    // ------------------------------------------------------------------
    // Libraries & versions
    // ------------------------------------------------------------------

    /// Ensures library and version rows exist, returning the version id.
    pub fn ensure_version(&self, library: &str, version: Option<&str>) -> Result<i64> {
        let conn = self.lock();
        ensure_version_in(&conn, library, version, &self.embedder)
    }

    fn version_id(&self, conn: &Connection, library: &str, version: Option<&str>) -> Result<Option<i64>> {
        let normalized = normalize_library_name(library);
        let version = normalize_version(version);
        conn.query_row(
            "SELECT v.id FROM versions v
             JOIN libraries l ON l.id = v.library_id
             WHERE l.name = ?1 AND v.name IS ?2",
            params![normalized, version],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    /// Resolves the best matching version for a semver target.
    ///
    /// `Ok(Some(name))` is a concrete match, `Ok(None)` the unversioned
    /// fallback; unknown libraries and unsatisfiable targets are
    /// [`Error::NotFound`].
    pub fn find_best_version(&self, library: &str, target: Option<&str>) -> Result<Option<String>> {
        let conn = self.lock();
        let normalized = normalize_library_name(library);
        let mut stmt = conn.prepare(
            "SELECT v.name FROM versions v
             JOIN libraries l ON l.id = v.library_id
             WHERE l.name = ?1",
        )?;
        let names: Vec<Option<String>> = stmt
            .query_map(params![normalized], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        if names.is_empty() {
            return Err(Error::NotFound(format!("library '{library}' is not indexed")));
        }

        let has_unversioned = names.iter().any(Option::is_none);
        let mut candidates: Vec<(semver::Version, String)> = names
            .into_iter()
            .flatten()
            .filter_map(|name| {
                semver::Version::parse(name.trim_start_matches('v'))
                    .ok()
                    .map(|parsed| (parsed, name))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let best = match normalize_version(target) {
            None => candidates.pop().map(|(_, name)| name),
            Some(target) => {
                let matched = if let Ok(exact) = semver::Version::parse(target.trim_start_matches('v')) {
                    candidates
                        .into_iter()
                        .filter(|(parsed, _)| *parsed == exact)
                        .next_back()
                } else {
                    let req = semver::VersionReq::parse(&target).map_err(|e| {
                        Error::InvalidUrl(format!("invalid version range '{target}': {e}"))
                    })?;
                    candidates
                        .into_iter()
                        .filter(|(parsed, _)| req.matches(parsed))
                        .next_back()
                };
                matched.map(|(_, name)| name)
            },
        };

        match best {
            Some(name) => Ok(Some(name)),
            None if has_unversioned => Ok(None),
            None => Err(Error::NotFound(format!(
                "no version of '{library}' satisfies '{}'",
                target.unwrap_or("latest")
            ))),
        }
    }

    /// Lists libraries with their version summaries, unversioned entry
    /// first.
    pub fn list_libraries(&self) -> Result<Vec<LibrarySummary>> {
        let conn = self.lock();
        let mut libraries = Vec::new();
        let mut lib_stmt =
            conn.prepare("SELECT id, display_name FROM libraries ORDER BY name")?;
        let rows: Vec<(i64, String)> = lib_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let mut version_stmt = conn.prepare(
            "SELECT v.name, v.status, v.error_message,
                    (SELECT COUNT(*) FROM pages p WHERE p.version_id = v.id)
             FROM versions v
             WHERE v.library_id = ?1
             ORDER BY v.name IS NOT NULL, v.name",
        )?;

        for (library_id, display_name) in rows {
            let versions: Vec<VersionSummary> = version_stmt
                .query_map(params![library_id], |row| {
                    let status: String = row.get(1)?;
                    Ok(VersionSummary {
                        version: row.get(0)?,
                        status: VersionStatus::parse(&status)
                            .unwrap_or(VersionStatus::NotIndexed),
                        pages: row.get::<_, i64>(3)?.try_into().unwrap_or(0),
                        error: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<_, _>>()?;
            libraries.push(LibrarySummary {
                library: display_name,
                versions,
            });
        }
        Ok(libraries)
    }

    // ------------------------------------------------------------------
    // Manager accessors
    // ------------------------------------------------------------------

    /// Versions currently in one of the given statuses.
    pub fn get_versions_by_status(&self, statuses: &[VersionStatus]) -> Result<Vec<VersionRecord>> {
        let conn = self.lock();
        let mut records = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT v.id, l.name, v.name, v.status, v.source_url, v.error_message
             FROM versions v JOIN libraries l ON l.id = v.library_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(3)?;
            Ok(VersionRecord {
                id: row.get(0)?,
                library: row.get(1)?,
                version: row.get(2)?,
                status: VersionStatus::parse(&status).unwrap_or(VersionStatus::NotIndexed),
                source_url: row.get(4)?,
                error_message: row.get(5)?,
            })
        })?;
        for record in rows {
            let record = record?;
            if statuses.contains(&record.status) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Versions whose stored root URL equals `url`.
    pub fn find_versions_by_source_url(&self, url: &str) -> Result<Vec<VersionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT v.id, l.name, v.name, v.status, v.source_url, v.error_message
             FROM versions v JOIN libraries l ON l.id = v.library_id
             WHERE v.source_url = ?1",
        )?;
        let rows: Vec<VersionRecord> = stmt
            .query_map(params![url], |row| {
                let status: String = row.get(3)?;
                Ok(VersionRecord {
                    id: row.get(0)?,
                    library: row.get(1)?,
                    version: row.get(2)?,
                    status: VersionStatus::parse(&status).unwrap_or(VersionStatus::NotIndexed),
                    source_url: row.get(4)?,
                    error_message: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    /// Loads the stored scraper options for a version.
    pub fn get_scraper_options(&self, library: &str, version: Option<&str>) -> Result<Option<ScraperOptions>> {
        let conn = self.lock();
        let Some(version_id) = self.version_id(&conn, library, version)? else {
            return Ok(None);
        };
        let json: Option<String> = conn.query_row(
            "SELECT scraper_options FROM versions WHERE id = ?1",
            params![version_id],
            |row| row.get(0),
        )?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Persists scraper options and the source URL on the version row.
    pub fn store_scraper_options(&self, library: &str, version: Option<&str>, options: &ScraperOptions) -> Result<()> {
        let json = serde_json::to_string(options)?;
        let conn = self.lock();
        let version_id = ensure_version_in(&conn, library, version, &self.embedder)?;
        conn.execute(
            "UPDATE versions SET scraper_options = ?1, source_url = ?2 WHERE id = ?3",
            params![json, options.url, version_id],
        )?;
        Ok(())
    }

    /// Write-through of a job status transition onto the version row.
    pub fn update_version_status(&self, library: &str, version: Option<&str>, status: VersionStatus, error: Option<&str>) -> Result<()> {
        let conn = self.lock();
        let version_id = ensure_version_in(&conn, library, version, &self.embedder)?;
        if status == VersionStatus::Running || status == VersionStatus::Updating {
            conn.execute(
                "UPDATE versions SET status = ?1, error_message = ?2,
                        started_at = datetime('now') WHERE id = ?3",
                params![status.as_str(), error, version_id],
            )?;
        } else {
            conn.execute(
                "UPDATE versions SET status = ?1, error_message = ?2 WHERE id = ?3",
                params![status.as_str(), error, version_id],
            )?;
        }
        debug!(library, ?version, status = status.as_str(), "version status persisted");
        Ok(())
    }

    /// Write-through of job progress onto the version row.
    pub fn update_version_progress(&self, library: &str, version: Option<&str>, pages: u32, max_pages: u32) -> Result<()> {
        let conn = self.lock();
        let version_id = ensure_version_in(&conn, library, version, &self.embedder)?;
        conn.execute(
            "UPDATE versions SET progress_pages = ?1, progress_max_pages = ?2 WHERE id = ?3",
            params![pages, max_pages, version_id],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pages & documents
    // ------------------------------------------------------------------

    /// Pages of a version, ordered by depth then URL. Used to seed refresh
    /// queues and for listings.
    pub fn get_pages(&self, library: &str, version: Option<&str>) -> Result<Vec<PageRecord>> {
        let conn = self.lock();
        let Some(version_id) = self.version_id(&conn, library, version)? else {
            return Ok(Vec::new());
        };
        let mut stmt = conn.prepare(
            "SELECT id, url, title, etag, depth, content_type
             FROM pages WHERE version_id = ?1 ORDER BY depth, url",
        )?;
        let rows: Vec<PageRecord> = stmt
            .query_map(params![version_id], |row| {
                Ok(PageRecord {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    title: row.get(2)?,
                    etag: row.get(3)?,
                    depth: row.get::<_, i64>(4)?.try_into().unwrap_or(0),
                    content_type: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    /// Inserts or replaces one page and its chunks atomically.
    ///
    /// Embeddings are computed per batch before the page transaction opens;
    /// inside the transaction the old chunks are deleted before any new
    /// chunk is inserted. Embedding failures surface as storage errors
    /// carrying the page URL.
    pub async fn add_scrape_result(
        &self,
        library: &str,
        version: Option<&str>,
        depth: u32,
        result: &ScrapeResult,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!(
                "store write for '{}' aborted",
                result.url
            )));
        }

        let texts: Vec<String> = result.chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_all(&texts).await.map_err(|e| {
                Error::Storage(format!("embedding failed for '{}': {e}", result.url))
            })?
        };

        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!(
                "store write for '{}' aborted",
                result.url
            )));
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let version_id = {
            ensure_version_in(&tx, library, version, &self.embedder)?
        };

        let page_id: i64 = tx.query_row(
            "INSERT INTO pages (version_id, url, title, etag, last_modified, content_type, depth)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(version_id, url) DO UPDATE SET
                 title = excluded.title,
                 etag = excluded.etag,
                 last_modified = excluded.last_modified,
                 content_type = excluded.content_type,
                 depth = excluded.depth
             RETURNING id",
            params![
                version_id,
                result.url,
                result.title,
                result.etag,
                result.last_modified,
                result.content_type,
                depth,
            ],
            |row| row.get(0),
        )?;

        tx.execute("DELETE FROM documents WHERE page_id = ?1", params![page_id])?;
        self.emit_probe(StoreOp::DeleteChunks, page_id);

        {
            let mut insert = tx.prepare(
                "INSERT INTO documents (page_id, content, metadata, sort_order, title, url, path, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (index, chunk) in result.chunks.iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled(format!(
                        "store write for '{}' aborted",
                        result.url
                    )));
                }
                let metadata = serde_json::to_string(&ChunkMetadata::from(chunk))?;
                let joined_path = chunk.section.path.join(" > ");
                let blob = vectors.get(index).map(|v| vec_to_blob(v));
                insert.execute(params![
                    page_id,
                    chunk.content,
                    metadata,
                    index as i64,
                    result.title.clone().unwrap_or_default(),
                    result.url,
                    joined_path,
                    blob,
                ])?;
                self.emit_probe(StoreOp::InsertChunk, page_id);
            }
        }

        tx.commit()?;
        debug!(url = %result.url, chunks = result.chunks.len(), "page stored");
        Ok(page_id)
    }

    /// Hard-deletes a page; chunks cascade.
    pub fn delete_page(&self, page_id: i64) -> Result<()> {
        let conn = self.lock();
        let affected = conn.execute("DELETE FROM pages WHERE id = ?1", params![page_id])?;
        if affected == 0 {
            return Err(Error::NotFound(format!("page {page_id} does not exist")));
        }
        self.emit_probe(StoreOp::DeletePage, page_id);
        Ok(())
    }

    /// Removes all pages (and chunks) of a version, keeping the version row.
    pub fn remove_all_documents(&self, library: &str, version: Option<&str>) -> Result<u64> {
        let conn = self.lock();
        let Some(version_id) = self.version_id(&conn, library, version)? else {
            return Ok(0);
        };
        let removed = conn.execute("DELETE FROM pages WHERE version_id = ?1", params![version_id])?;
        Ok(removed as u64)
    }

    /// Removes a version entirely, cascading to pages and chunks; the
    /// library row goes too when its last version is removed.
    pub fn remove_version(&self, library: &str, version: Option<&str>) -> Result<()> {
        let conn = self.lock();
        let Some(version_id) = self.version_id(&conn, library, version)? else {
            return Err(Error::NotFound(format!(
                "{library}@{} is not indexed",
                version.unwrap_or("unversioned")
            )));
        };
        let library_id: i64 = conn.query_row(
            "SELECT library_id FROM versions WHERE id = ?1",
            params![version_id],
            |row| row.get(0),
        )?;
        conn.execute("DELETE FROM versions WHERE id = ?1", params![version_id])?;
        let remaining: i64 = conn.query_row(
            "SELECT COUNT(*) FROM versions WHERE library_id = ?1",
            params![library_id],
            |row| row.get(0),
        )?;
        if remaining == 0 {
            conn.execute("DELETE FROM libraries WHERE id = ?1", params![library_id])?;
        }
        Ok(())
    }
}

/// Ensures library and version rows exist; shared by connection-holding and
/// transaction-holding callers.
fn ensure_version_in(conn: &Connection, library: &str, version: Option<&str>, embedder: &Embedder) -> Result<i64> {
    let normalized = normalize_library_name(library);
    let version = normalize_version(version);

    conn.execute(
        "INSERT INTO libraries (name, display_name) VALUES (?1, ?2)
         ON CONFLICT(name) DO NOTHING",
        params![normalized, library.trim()],
    )?;
    let library_id: i64 = conn.query_row(
        "SELECT id FROM libraries WHERE name = ?1",
        params![normalized],
        |row| row.get(0),
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM versions WHERE library_id = ?1 AND name IS ?2",
            params![library_id, version],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO versions (library_id, name, embedding_model, embedding_dimension)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            library_id,
            version,
            embedder.model(),
            embedder.dimension() as i64
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn is_busy(err: &Error) -> bool {
    matches!(err, Error::Storage(message) if message.contains("locked") || message.contains("busy"))
}
