//! Hybrid retrieval: vector + full-text candidates fused with Reciprocal
//! Rank Fusion, then expanded into content-aware assembled regions.
//!
//! The ranking pipeline:
//!
//! 1. embed the query;
//! 2. vector top-`limit × VECTOR_MULTIPLIER` within the resolved
//!    `(library, version)`;
//! 3. FTS top-`limit × FTS_OVERFETCH` using the dual-mode match query;
//! 4. fuse with `score(d) = w_vec/(k + rank_vec) + w_fts/(k + rank_fts)`,
//!    missing ranks contributing nothing;
//! 5. keep the top `limit`, ordering ties deterministically by chunk id;
//! 6. expand each hit into its surrounding context and assemble per page
//!    ([`assembly`]).

pub mod assembly;

use crate::store::Store;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Vector candidate over-fetch factor.
pub const VECTOR_MULTIPLIER: usize = 10;

/// FTS candidate over-fetch factor.
pub const FTS_OVERFETCH: usize = 2;

/// RRF smoothing constant.
pub const RRF_K: f64 = 60.0;

/// Weights applied to the two rankers.
#[derive(Debug, Clone, Copy)]
pub struct RrfWeights {
    /// Weight of the vector ranking.
    pub vector: f64,
    /// Weight of the full-text ranking.
    pub fts: f64,
}

impl Default for RrfWeights {
    fn default() -> Self {
        Self {
            vector: 1.0,
            fts: 1.0,
        }
    }
}

/// One assembled search result region.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchMatch {
    /// URL of the page the region came from.
    pub url: String,
    /// Page title, when known.
    pub title: Option<String>,
    /// MIME type of the page content.
    pub content_type: String,
    /// Assembled region text.
    pub content: String,
    /// Best fused score among the region's matched chunks.
    pub score: f64,
}

/// Hybrid search over a [`Store`].
pub struct Retriever {
    store: Arc<Store>,
    weights: RrfWeights,
}

impl Retriever {
    /// Creates a retriever with default weights.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            weights: RrfWeights::default(),
        }
    }

    /// Overrides the ranker weights.
    #[must_use]
    pub const fn with_weights(mut self, weights: RrfWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Executes a hybrid search scoped to the best-matching version.
    pub async fn search(
        &self,
        library: &str,
        version: Option<&str>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let resolved = self.store.find_best_version(library, version)?;
        let resolved_ref = resolved.as_deref();

        let query_vector = self.store.embedder().embed_query(query).await?;
        let vector = self
            .store
            .vector_candidates(library, resolved_ref, &query_vector, limit * VECTOR_MULTIPLIER)?;
        let fts = self
            .store
            .fts_candidates(library, resolved_ref, query, limit * FTS_OVERFETCH)?;

        let fused = fuse(
            vector.iter().map(|c| c.id),
            fts.iter().map(|c| c.id),
            self.weights,
        );
        debug!(
            library,
            version = ?resolved_ref,
            vector = vector.len(),
            fts = fts.len(),
            fused = fused.len(),
            "hybrid candidates fused"
        );

        let top: Vec<(i64, f64)> = fused.into_iter().take(limit).collect();
        assembly::assemble(&self.store, &top)
    }
}

/// Reciprocal Rank Fusion over two ranked id lists.
///
/// Returns `(chunk id, fused score)` sorted by descending score with
/// deterministic ties (ascending chunk id). A document absent from one
/// ranking is treated as having infinite rank there.
fn fuse(
    vector_ranked: impl Iterator<Item = i64>,
    fts_ranked: impl Iterator<Item = i64>,
    weights: RrfWeights,
) -> Vec<(i64, f64)> {
    let mut scores: HashMap<i64, f64> = HashMap::new();

    for (index, id) in vector_ranked.enumerate() {
        let rank = (index + 1) as f64;
        *scores.entry(id).or_default() += weights.vector / (RRF_K + rank);
    }
    for (index, id) in fts_ranked.enumerate() {
        let rank = (index + 1) as f64;
        *scores.entry(id).or_default() += weights.fts / (RRF_K + rank);
    }

    let mut fused: Vec<(i64, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    fused
}
