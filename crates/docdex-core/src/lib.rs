//! # docdex-core
//!
//! Core functionality for docdex - a documentation indexing and semantic
//! search service.
//!
//! docdex ingests developer documentation from web pages and local files,
//! normalizes heterogeneous content (HTML, Markdown, JSON, source code)
//! into hierarchically structured chunks, computes vector embeddings, and
//! serves hybrid (vector + full-text) queries scoped by library and
//! version from an embedded SQLite store.
//!
//! ## Architecture
//!
//! Three subsystems make up the core:
//!
//! - **Ingestion pipeline** ([`jobs`]): a persistent, recoverable,
//!   concurrency-limited job engine with write-through state,
//!   cancellation, and an event bus; the remote client mirrors the
//!   manager's contract over RPC.
//! - **Content processing** ([`fetcher`], [`content`], [`splitter`]):
//!   fetch → decode → parse → chunk, with hierarchical chunking per
//!   content type and a greedy merge pass.
//! - **Storage & retrieval** ([`store`], [`embedder`], [`retriever`]):
//!   normalized library→version→page→chunk schema, conditional refresh
//!   over etags, and Reciprocal Rank Fusion over vector and FTS rankings
//!   with content-aware result assembly.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use docdex_core::{Config, EventBus, JobDispatch, PipelineManager, Retriever, Store};
//! use docdex_core::embedder::{create_provider, Embedder};
//! use docdex_core::types::ScraperOptions;
//! use std::sync::Arc;
//!
//! # async fn run() -> docdex_core::Result<()> {
//! let config = Config::default();
//! let embedder = Embedder::new(create_provider(&config.embedding)?);
//! let store = Arc::new(Store::open(&config.database_path()?, embedder)?);
//!
//! let manager = PipelineManager::new(Arc::clone(&store), EventBus::new(), &config)?;
//! let job = manager
//!     .enqueue_scrape_job(ScraperOptions::new(
//!         "https://docs.example.com/",
//!         "example",
//!         Some("1.0.0".to_string()),
//!     ))
//!     .await?;
//! manager.wait_for_job_completion(&job).await?;
//!
//! let retriever = Retriever::new(store);
//! let matches = retriever.search("example", Some("1.x"), "how do I start", 5).await?;
//! # Ok(())
//! # }
//! ```

/// Configuration records and the data-directory fallback chain
pub mod config;
/// MIME-selected content pipelines with middleware chains
pub mod content;
/// Embedding providers, batch planning, and vector BLOB helpers
pub mod embedder;
/// Error types and result aliases
pub mod error;
/// HTTP and file fetching with conditional request support
pub mod fetcher;
/// Job manager, worker, events, and the remote client
pub mod jobs;
/// Hybrid retrieval with RRF fusion and content-aware assembly
pub mod retriever;
/// The crawl strategy: frontier, scope filters, progress reporting
pub mod scraper;
/// Hierarchical content splitters and the greedy optimizer
pub mod splitter;
/// The embedded relational + vector store
pub mod store;
/// Core data types shared across the subsystems
pub mod types;

// Re-export commonly used types
pub use config::{ChunkSizes, Config, EmbeddingConfig};
pub use error::{Error, Result};
pub use fetcher::{FetchOptions, Fetcher, FileFetcher, HttpFetcher};
pub use jobs::{Event, EventBus, Job, JobDispatch, PipelineManager};
pub use retriever::{Retriever, SearchMatch};
pub use scraper::WebScraperStrategy;
pub use store::Store;
pub use types::{Chunk, ProgressEvent, ScrapeResult, ScraperOptions, Section};
