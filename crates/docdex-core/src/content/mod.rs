//! MIME-selected content pipelines.
//!
//! A pipeline turns [`RawContent`] into a [`ScrapeResult`] by running an
//! ordered middleware chain over a [`PipelineContext`]. Middlewares mutate
//! the context in order (the "next" continuation is simply the tail of the
//! chain) and record non-fatal problems on `context.errors` instead of
//! propagating them as control flow; returning `Err` aborts the chain and is
//! reserved for failures that make downstream stages meaningless.
//!
//! Selection is by MIME type through [`ContentPipeline::can_process`]; the
//! [`TextPipeline`] accepts everything and terminates the search.

mod decode;
mod html;
mod json;
mod markdown;
mod source;
mod text;

pub use decode::decode_bytes;
pub use html::HtmlPipeline;
pub use json::JsonPipeline;
pub use markdown::MarkdownPipeline;
pub use source::SourceCodePipeline;
pub use text::TextPipeline;

use crate::config::ChunkSizes;
use crate::types::{Chunk, RawContent, ScrapeResult};
use crate::Result;

/// Options shared by all pipelines for one job.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Splitter size bounds.
    pub chunk_sizes: ChunkSizes,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_sizes: ChunkSizes::default(),
        }
    }
}

/// Mutable state threaded through a middleware chain.
pub struct PipelineContext<'a> {
    /// Decoded content; transforms replace it in place.
    pub content: String,
    /// Source URL the content came from.
    pub source: String,
    /// Extracted title, when known.
    pub title: Option<String>,
    /// Extracted description, when known.
    pub description: Option<String>,
    /// Current MIME type; conversion middlewares update it.
    pub content_type: String,
    /// Absolute links discovered on the page.
    pub links: Vec<String>,
    /// Non-fatal errors accumulated while processing.
    pub errors: Vec<String>,
    /// Hierarchical chunks produced by the split stage.
    pub chunks: Vec<Chunk>,
    /// Job-level options.
    pub options: &'a PipelineOptions,
}

impl<'a> PipelineContext<'a> {
    fn new(raw: &RawContent, options: &'a PipelineOptions) -> Self {
        let (content, errors) = decode_bytes(&raw.content, raw.charset.as_deref());
        Self {
            content,
            source: raw.source.clone(),
            title: None,
            description: None,
            content_type: raw.mime_type.clone(),
            links: Vec::new(),
            errors,
            chunks: Vec::new(),
            options,
        }
    }

    fn into_result(self, raw: &RawContent) -> ScrapeResult {
        ScrapeResult {
            url: self.source,
            title: self.title,
            content_type: self.content_type,
            text_content: self.content,
            links: self.links,
            errors: self.errors,
            chunks: self.chunks,
            etag: raw.etag.clone(),
            last_modified: raw.last_modified.clone(),
        }
    }
}

/// One stage of a pipeline.
pub trait Middleware: Send + Sync {
    /// Stage name for diagnostics.
    fn name(&self) -> &'static str;

    /// Transforms the context. Non-fatal problems go on `context.errors`;
    /// `Err` aborts the remaining chain.
    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()>;
}

/// A MIME-selected processing pipeline.
pub trait ContentPipeline: Send + Sync {
    /// Whether this pipeline handles the MIME type.
    fn can_process(&self, mime_type: &str) -> bool;

    /// The ordered middleware chain.
    fn middlewares(&self) -> Vec<Box<dyn Middleware>>;

    /// Runs the chain over freshly decoded content.
    fn process(&self, raw: &RawContent, options: &PipelineOptions) -> Result<ScrapeResult> {
        let mut context = PipelineContext::new(raw, options);
        for middleware in self.middlewares() {
            if let Err(err) = middleware.run(&mut context) {
                tracing::warn!(
                    stage = middleware.name(),
                    source = %context.source,
                    "pipeline stage failed: {err}"
                );
                return Err(err);
            }
        }
        Ok(context.into_result(raw))
    }
}

/// The standard pipeline set in selection order.
#[must_use]
pub fn standard_pipelines() -> Vec<Box<dyn ContentPipeline>> {
    vec![
        Box::new(HtmlPipeline),
        Box::new(MarkdownPipeline),
        Box::new(JsonPipeline),
        Box::new(SourceCodePipeline),
        Box::new(TextPipeline),
    ]
}

/// Picks the first pipeline that claims the MIME type.
#[must_use]
pub fn select_pipeline<'a>(
    pipelines: &'a [Box<dyn ContentPipeline>],
    mime_type: &str,
) -> Option<&'a dyn ContentPipeline> {
    pipelines
        .iter()
        .find(|p| p.can_process(mime_type))
        .map(AsRef::as_ref)
}
