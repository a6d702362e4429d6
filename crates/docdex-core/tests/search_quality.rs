//! Retrieval and splitter scenarios: JSON bound fallback, source-code
//! chunking through the pipeline, hybrid search determinism, and assembly.

#![allow(clippy::unwrap_used, clippy::panic)]

use docdex_core::content::{ContentPipeline, PipelineOptions, SourceCodePipeline};
use docdex_core::embedder::{Embedder, HashingProvider};
use docdex_core::splitter::{ContentSplitter, JsonSplitter};
use docdex_core::store::Store;
use docdex_core::types::{Chunk, FetchStatus, RawContent, ScrapeResult};
use docdex_core::Retriever;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn test_store() -> Arc<Store> {
    let embedder = Embedder::new(Arc::new(HashingProvider::new(64)));
    Arc::new(Store::open_in_memory(embedder).unwrap())
}

/// A JSON document with 5000 trivial keys blows the chunk-count bound and
/// falls back to text splitting while staying parseable after
/// concatenation.
#[test]
fn json_max_chunks_falls_back_to_text() {
    let mut content = String::from("{");
    for i in 0..5000 {
        if i > 0 {
            content.push(',');
        }
        content.push_str(&format!("\"k{i}\":{i}"));
    }
    content.push('}');

    let chunks = JsonSplitter::new(5000).split(&content).unwrap();
    for chunk in &chunks {
        assert_eq!(chunk.section.level, 0);
        assert!(chunk.section.path.is_empty());
    }

    let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(rebuilt, content);
    let original: serde_json::Value = serde_json::from_str(&content).unwrap();
    let reparsed: serde_json::Value = serde_json::from_str(&rebuilt).unwrap();
    assert_eq!(original, reparsed);
}

/// A TypeScript class with documented methods chunks into a structural
/// header (JSDoc attached), one content chunk per method, and a structural
/// closer, reconstructing byte-exactly.
#[test]
fn typescript_class_chunks_through_pipeline() {
    let code = "/** Service doc. */\nclass Svc {\n  /** a doc */\n  a() {\n    return 1;\n  }\n\n  /** b doc */\n  b() {\n    return 2;\n  }\n}\n";
    let raw = RawContent {
        content: code.as_bytes().to_vec(),
        mime_type: "text/x-typescript".to_string(),
        charset: None,
        encoding: None,
        source: "file:///src/File.ts".to_string(),
        etag: None,
        last_modified: None,
        status: FetchStatus::Success,
    };
    let result = SourceCodePipeline
        .process(&raw, &PipelineOptions::default())
        .unwrap();

    let rebuilt: String = result.chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(rebuilt, code);
    assert_eq!(result.chunks.len(), 4);

    let paths: Vec<Vec<String>> = result
        .chunks
        .iter()
        .map(|c| c.section.path.clone())
        .collect();
    assert_eq!(
        paths,
        vec![
            vec!["File.ts".to_string(), "Svc".to_string()],
            vec!["File.ts".to_string(), "Svc".to_string(), "a".to_string()],
            vec!["File.ts".to_string(), "Svc".to_string(), "b".to_string()],
            vec!["File.ts".to_string(), "Svc".to_string()],
        ]
    );

    assert!(result.chunks[0].types.iter().any(|t| t == "structural"));
    assert!(result.chunks[0].content.contains("Service doc."));
    assert!(result.chunks[1].types.iter().any(|t| t == "content"));
    assert!(result.chunks[1].content.contains("a doc"));
    assert!(result.chunks[3].types.iter().any(|t| t == "structural"));
}

async fn seed_page(store: &Arc<Store>, url: &str, content_type: &str, chunks: Vec<Chunk>) {
    let result = ScrapeResult {
        url: url.to_string(),
        title: Some("Seeded".to_string()),
        content_type: content_type.to_string(),
        text_content: String::new(),
        links: Vec::new(),
        errors: Vec::new(),
        chunks,
        etag: None,
        last_modified: None,
    };
    store
        .add_scrape_result("lib", Some("1.0.0"), 0, &result, &CancellationToken::new())
        .await
        .unwrap();
}

/// Repeated identical queries return identical orderings; equal-score
/// candidates resolve by chunk id.
#[tokio::test]
async fn hybrid_search_is_deterministic() {
    let store = test_store();
    let chunks: Vec<Chunk> = (0..10)
        .map(|i| {
            Chunk::new(
                "markdown",
                if i < 2 {
                    "shared retry backoff guidance".to_string()
                } else {
                    format!("unrelated filler text number {i}")
                },
                1,
                vec![format!("S{i}")],
            )
        })
        .collect();
    seed_page(&store, "file:///docs/guide.md", "text/markdown", chunks).await;

    let retriever = Retriever::new(Arc::clone(&store));
    let first = retriever
        .search("lib", Some("1.0.0"), "retry backoff", 3)
        .await
        .unwrap();
    let second = retriever
        .search("lib", Some("1.0.0"), "retry backoff", 3)
        .await
        .unwrap();

    assert!(!first.is_empty());
    let urls: Vec<&str> = first.iter().map(|m| m.url.as_str()).collect();
    let urls_again: Vec<&str> = second.iter().map(|m| m.url.as_str()).collect();
    assert_eq!(urls, urls_again);
    let scores: Vec<f64> = first.iter().map(|m| m.score).collect();
    let scores_again: Vec<f64> = second.iter().map(|m| m.score).collect();
    assert_eq!(scores, scores_again);
}

/// Broad-context assembly pulls sibling and parent context into the region
/// around a markdown match.
#[tokio::test]
async fn markdown_matches_assemble_with_context() {
    let store = test_store();
    let chunks = vec![
        Chunk::new("markdown", "# Jobs\n\n", 1, vec!["Jobs".to_string()]),
        Chunk::new(
            "markdown",
            "Queued jobs wait for a free worker slot.\n\n",
            1,
            vec!["Jobs".to_string()],
        ),
        Chunk::new(
            "markdown",
            "Cancellation releases the slot immediately.\n\n",
            1,
            vec!["Jobs".to_string()],
        ),
        Chunk::new(
            "markdown",
            "Completed jobs stay queryable until cleared.\n",
            1,
            vec!["Jobs".to_string()],
        ),
    ];
    seed_page(&store, "file:///docs/jobs.md", "text/markdown", chunks).await;

    let retriever = Retriever::new(Arc::clone(&store));
    let matches = retriever
        .search("lib", Some("1.0.0"), "cancellation slot", 1)
        .await
        .unwrap();

    assert_eq!(matches.len(), 1);
    let region = &matches[0].content;
    assert!(region.contains("Cancellation releases"));
    // Neighboring siblings join the region with blank-line separators.
    assert!(region.contains("Queued jobs wait"));
    assert!(region.contains("\n\n"));
}

/// Hierarchical assembly returns the whole enclosing declaration for a
/// source-code match.
#[tokio::test]
async fn source_matches_assemble_whole_declaration() {
    let store = test_store();
    let chunks = vec![
        Chunk::new(
            "code",
            "class Pool {\n",
            2,
            vec!["pool.ts".to_string(), "Pool".to_string()],
        ),
        Chunk::new(
            "code",
            "  acquire() { return this.slots.pop(); }\n",
            3,
            vec![
                "pool.ts".to_string(),
                "Pool".to_string(),
                "acquire".to_string(),
            ],
        ),
        Chunk::new(
            "code",
            "  release(slot) { this.slots.push(slot); }\n",
            3,
            vec![
                "pool.ts".to_string(),
                "Pool".to_string(),
                "release".to_string(),
            ],
        ),
        Chunk::new(
            "code",
            "}\n",
            2,
            vec!["pool.ts".to_string(), "Pool".to_string()],
        ),
    ];
    seed_page(&store, "file:///src/pool.ts", "text/x-typescript", chunks).await;

    let retriever = Retriever::new(Arc::clone(&store));
    let matches = retriever
        .search("lib", Some("1.0.0"), "acquire slots", 1)
        .await
        .unwrap();

    assert_eq!(matches.len(), 1);
    // The full class body assembles seamlessly.
    assert_eq!(
        matches[0].content,
        "class Pool {\n  acquire() { return this.slots.pop(); }\n  release(slot) { this.slots.push(slot); }\n}\n"
    );
}

/// Searching an unknown version resolves through semver and errors for
/// unsatisfiable targets.
#[tokio::test]
async fn search_resolves_versions() {
    let store = test_store();
    seed_page(
        &store,
        "file:///docs/a.md",
        "text/markdown",
        vec![Chunk::new("markdown", "resolver text body", 0, Vec::new())],
    )
    .await;

    let retriever = Retriever::new(Arc::clone(&store));
    // "1.x" resolves to the indexed 1.0.0.
    let matches = retriever
        .search("lib", Some("1.x"), "resolver", 2)
        .await
        .unwrap();
    assert!(!matches.is_empty());

    let missing = retriever.search("lib", Some("9.x"), "resolver", 2).await;
    assert!(missing.is_err());
}
