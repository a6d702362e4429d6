//! Search primitives: FTS5 candidates and brute-force vector candidates.
//!
//! Both queries are scoped to one `(library, version)` and return ranked
//! candidate lists for the retriever to fuse. The FTS query runs in dual
//! mode: an exact-phrase form unioned with a keyword-AND form, so both
//! "job queue" the phrase and documents containing every keyword rank.

use super::{PageRecord, Store, StoredChunk};
use crate::embedder::{blob_to_vec, cosine_similarity};
use crate::types::{normalize_library_name, normalize_version};
use crate::{Error, Result};
use rusqlite::{params, OptionalExtension};

/// One full-text candidate; `score` is the raw FTS5 rank (lower is better).
#[derive(Debug, Clone, Copy)]
pub struct FtsCandidate {
    /// Chunk row id.
    pub id: i64,
    /// Raw FTS5 `rank` value.
    pub score: f64,
}

/// One vector candidate; `score` is cosine similarity (higher is better).
#[derive(Debug, Clone, Copy)]
pub struct VectorCandidate {
    /// Chunk row id.
    pub id: i64,
    /// Cosine similarity against the query embedding.
    pub score: f32,
}

/// Builds the dual-mode FTS5 match expression.
fn build_match_query(query: &str) -> Option<String> {
    let escaped = query.replace('"', "\"\"");
    let tokens: Vec<&str> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return None;
    }
    let phrase = format!("\"{escaped}\"");
    if tokens.len() == 1 {
        return Some(phrase);
    }
    let keywords = tokens
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" AND ");
    Some(format!("({phrase}) OR ({keywords})"))
}

impl Store {
    /// Top full-text candidates for a query within `(library, version)`.
    pub fn fts_candidates(
        &self,
        library: &str,
        version: Option<&str>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<FtsCandidate>> {
        let Some(match_query) = build_match_query(query) else {
            return Ok(Vec::new());
        };
        let normalized = normalize_library_name(library);
        let version = normalize_version(version);

        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT d.id, documents_fts.rank
             FROM documents_fts
             JOIN documents d ON d.id = documents_fts.rowid
             JOIN pages p ON p.id = d.page_id
             JOIN versions v ON v.id = p.version_id
             JOIN libraries l ON l.id = v.library_id
             WHERE documents_fts MATCH ?1
               AND l.name = ?2
               AND v.name IS ?3
             ORDER BY documents_fts.rank, d.id
             LIMIT ?4",
        )?;
        let rows: Vec<FtsCandidate> = stmt
            .query_map(
                params![match_query, normalized, version, limit as i64],
                |row| {
                    Ok(FtsCandidate {
                        id: row.get(0)?,
                        score: row.get(1)?,
                    })
                },
            )?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    /// Top vector candidates by cosine similarity within `(library,
    /// version)`. Brute-force over the stored embedding BLOBs; ties break
    /// by ascending chunk id.
    pub fn vector_candidates(
        &self,
        library: &str,
        version: Option<&str>,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorCandidate>> {
        let normalized = normalize_library_name(library);
        let version = normalize_version(version);

        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT d.id, d.embedding
             FROM documents d
             JOIN pages p ON p.id = d.page_id
             JOIN versions v ON v.id = p.version_id
             JOIN libraries l ON l.id = v.library_id
             WHERE d.embedding IS NOT NULL
               AND l.name = ?1
               AND v.name IS ?2",
        )?;
        let mut candidates: Vec<VectorCandidate> = stmt
            .query_map(params![normalized, version], |row| {
                let id: i64 = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id, blob)| VectorCandidate {
                id,
                score: cosine_similarity(query_vector, &blob_to_vec(&blob)),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Loads chunk rows by id, in the order given.
    pub fn get_chunks(&self, ids: &[i64]) -> Result<Vec<StoredChunk>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, page_id, content, metadata, sort_order
             FROM documents WHERE id = ?1",
        )?;
        let mut chunks = Vec::with_capacity(ids.len());
        for id in ids {
            let row = stmt
                .query_row(params![id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })
                .optional()?;
            if let Some((id, page_id, content, metadata, sort_order)) = row {
                chunks.push(StoredChunk {
                    id,
                    page_id,
                    content,
                    metadata: serde_json::from_str(&metadata)?,
                    sort_order: sort_order.try_into().unwrap_or(0),
                });
            }
        }
        Ok(chunks)
    }

    /// All chunks of a page in `sort_order`.
    pub fn get_page_chunks(&self, page_id: i64) -> Result<Vec<StoredChunk>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, page_id, content, metadata, sort_order
             FROM documents WHERE page_id = ?1 ORDER BY sort_order",
        )?;
        let rows: Vec<StoredChunk> = stmt
            .query_map(params![page_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id, page_id, content, metadata, sort_order)| {
                Ok(StoredChunk {
                    id,
                    page_id,
                    content,
                    metadata: serde_json::from_str(&metadata)?,
                    sort_order: sort_order.try_into().unwrap_or(0),
                })
            })
            .collect::<Result<_>>()?;
        Ok(rows)
    }

    /// Loads one page row.
    pub fn get_page(&self, page_id: i64) -> Result<PageRecord> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, url, title, etag, depth, content_type
             FROM pages WHERE id = ?1",
            params![page_id],
            |row| {
                Ok(PageRecord {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    title: row.get(2)?,
                    etag: row.get(3)?,
                    depth: row.get::<_, i64>(4)?.try_into().unwrap_or(0),
                    content_type: row.get(5)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("page {page_id} does not exist")))
    }
}
