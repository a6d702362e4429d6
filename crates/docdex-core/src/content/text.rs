//! Plain-text fallback pipeline.

use super::{ContentPipeline, Middleware, PipelineContext};
use crate::splitter::{optimize, ContentSplitter, TextSplitter};
use crate::Result;

/// Fallback pipeline: decode only, then line-based splitting.
///
/// Accepts every MIME type, so it terminates pipeline selection.
pub struct TextPipeline;

impl ContentPipeline for TextPipeline {
    fn can_process(&self, _mime_type: &str) -> bool {
        true
    }

    fn middlewares(&self) -> Vec<Box<dyn Middleware>> {
        vec![Box::new(SplitText)]
    }
}

struct SplitText;

impl Middleware for SplitText {
    fn name(&self) -> &'static str {
        "text-split"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let splitter = TextSplitter::new(context.options.chunk_sizes.max_size);
        let chunks = splitter.split(&context.content)?;
        context.chunks = optimize::optimize(chunks, context.options.chunk_sizes);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::content::PipelineOptions;
    use crate::types::{FetchStatus, RawContent};

    #[test]
    fn test_decode_and_split_only() {
        let raw = RawContent {
            content: b"plain text body\n\nwith two paragraphs\n".to_vec(),
            mime_type: "text/plain".to_string(),
            charset: None,
            encoding: None,
            source: "file:///notes.txt".to_string(),
            etag: None,
            last_modified: None,
            status: FetchStatus::Success,
        };
        let options = PipelineOptions::default();
        let result = TextPipeline.process(&raw, &options).unwrap();
        assert_eq!(result.content_type, "text/plain");
        assert!(result.title.is_none());
        let rebuilt: String = result.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, result.text_content);
    }
}
