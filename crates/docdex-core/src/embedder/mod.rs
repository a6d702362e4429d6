//! Embedding providers and batch planning.
//!
//! The core treats embedding as a single capability: encode a batch of texts
//! into fixed-dimension vectors. Provider choice is configuration only:
//!
//! - [`OpenAiProvider`] speaks to any OpenAI-compatible `/embeddings`
//!   endpoint, with retry and backoff for transient failures.
//! - [`HashingProvider`] is a deterministic token-hash projection with no
//!   network dependency; it backs tests and offline indexing.
//!
//! [`Embedder`] wraps a provider with the batch planner: requests carry at
//! most [`MAX_BATCH_ITEMS`] texts and [`MAX_BATCH_CHARS`] total characters;
//! oversized inputs are split across successive requests.
//!
//! Vectors persist as little-endian `f32` BLOBs via [`vec_to_blob`] /
//! [`blob_to_vec`].

mod openai;

pub use openai::OpenAiProvider;

use crate::config::EmbeddingConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Maximum texts per provider request.
pub const MAX_BATCH_ITEMS: usize = 100;

/// Maximum total characters per provider request.
pub const MAX_BATCH_CHARS: usize = 50_000;

/// A batch text-embedding capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded with indexed versions.
    fn model(&self) -> &str;

    /// Vector dimensionality.
    fn dimension(&self) -> usize;

    /// Encodes one batch. Callers go through [`Embedder`], which enforces
    /// the batch limits.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Creates the configured provider.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "" | "hashing" => Ok(Arc::new(HashingProvider::new(
            config.dimension.unwrap_or(HashingProvider::DEFAULT_DIMENSION),
        ))),
        other => Err(Error::Config(format!("unknown embedding provider '{other}'"))),
    }
}

/// Batch-planning wrapper around a provider.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl Embedder {
    /// Wraps a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// The wrapped provider's model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// The wrapped provider's vector dimensionality.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Embeds all texts, splitting them into requests that respect the item
    /// and character limits. Results come back in input order.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in plan_batches(texts) {
            let embedded = self.provider.embed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Embeds a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_all(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".into()))
    }
}

/// Splits `texts` into contiguous batches under both limits. A single text
/// larger than the character limit still travels, alone in its batch.
fn plan_batches(texts: &[String]) -> Vec<&[String]> {
    let mut batches = Vec::new();
    let mut start = 0usize;
    let mut chars = 0usize;
    for (i, text) in texts.iter().enumerate() {
        let len = text.chars().count();
        let at_capacity = i > start && (i - start >= MAX_BATCH_ITEMS || chars + len > MAX_BATCH_CHARS);
        if at_capacity {
            batches.push(&texts[start..i]);
            start = i;
            chars = 0;
        }
        chars += len;
    }
    if start < texts.len() {
        batches.push(&texts[start..]);
    }
    batches
}

/// Encodes a vector as little-endian `f32` bytes for BLOB storage.
#[must_use]
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decodes a little-endian `f32` BLOB back into a vector.
#[must_use]
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors; 0.0 when either is zero-length.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Deterministic token-hash embedding provider.
///
/// Tokens are lowercased, FNV-1a hashed, and bucketed into the configured
/// dimension; the result is L2-normalized. Similar texts share buckets, so
/// ranking behaves sensibly enough for tests and offline use.
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    /// Default dimensionality for the hashing provider.
    pub const DEFAULT_DIMENSION: usize = 256;

    /// Creates a provider with the given dimensionality.
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let bucket = fnv1a(&token.to_lowercase()) as usize % self.dimension;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn model(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_provider_is_deterministic() {
        let provider = HashingProvider::new(64);
        let a = provider.embed(&["retry with backoff".to_string()]).await.unwrap();
        let b = provider.embed(&["retry with backoff".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn test_similar_texts_rank_above_unrelated() {
        let provider = HashingProvider::new(128);
        let vectors = provider
            .embed(&[
                "http fetch retry backoff".to_string(),
                "fetch retry".to_string(),
                "completely different topic entirely".to_string(),
            ])
            .await
            .unwrap();
        let close = cosine_similarity(&vectors[0], &vectors[1]);
        let far = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(close > far);
    }

    #[test]
    fn test_blob_round_trip_little_endian() {
        let vector = vec![1.0f32, -0.5, 0.25, 3.75];
        let blob = vec_to_blob(&vector);
        assert_eq!(blob.len(), 16);
        // Spot-check the first value's little-endian layout.
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(blob_to_vec(&blob), vector);
    }

    #[test]
    fn test_plan_batches_item_limit() {
        let texts: Vec<String> = (0..250).map(|i| format!("t{i}")).collect();
        let batches = plan_batches(&texts);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), MAX_BATCH_ITEMS);
        assert_eq!(batches[1].len(), MAX_BATCH_ITEMS);
        assert_eq!(batches[2].len(), 50);
    }

    #[test]
    fn test_plan_batches_char_limit() {
        let big = "x".repeat(30_000);
        let texts = vec![big.clone(), big.clone(), big];
        let batches = plan_batches(&texts);
        assert_eq!(batches.len(), 3, "30k texts cannot pair under the 50k cap");
    }

    #[test]
    fn test_plan_batches_oversized_single_text() {
        let texts = vec!["y".repeat(80_000)];
        let batches = plan_batches(&texts);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }

    #[tokio::test]
    async fn test_embedder_preserves_order_across_batches() {
        let embedder = Embedder::new(Arc::new(HashingProvider::new(16)));
        let texts: Vec<String> = (0..120).map(|i| format!("text number {i}")).collect();
        let vectors = embedder.embed_all(&texts).await.unwrap();
        assert_eq!(vectors.len(), 120);
        let direct = HashingProvider::new(16).encode("text number 119");
        assert_eq!(vectors[119], direct);
    }

    #[test]
    fn test_cosine_similarity_edges() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        let v = [0.6f32, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
