//! JSON processing: validation, metadata extraction, structural splitting.

use super::{ContentPipeline, Middleware, PipelineContext};
use crate::splitter::{ContentSplitter, JsonSplitter};
use crate::Result;
use serde_json::Value;

/// Title keys probed in order on the top-level object.
const TITLE_KEYS: &[&str] = &["title", "name", "displayName", "label"];

/// Description keys probed in order on the top-level object.
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "about", "info"];

/// Pipeline for JSON documents.
///
/// Invalid JSON is preserved verbatim: the parse error is recorded on the
/// context and the split stage falls back to text chunks.
pub struct JsonPipeline;

impl ContentPipeline for JsonPipeline {
    fn can_process(&self, mime_type: &str) -> bool {
        mime_type == "application/json"
            || mime_type == "text/json"
            || mime_type.ends_with("+json")
    }

    fn middlewares(&self) -> Vec<Box<dyn Middleware>> {
        vec![Box::new(ExtractJsonMetadata), Box::new(SplitJson)]
    }
}

/// Parses the document and pulls title/description from conventional keys.
struct ExtractJsonMetadata;

impl Middleware for ExtractJsonMetadata {
    fn name(&self) -> &'static str {
        "json-metadata"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let value: Value = match serde_json::from_str(&context.content) {
            Ok(value) => value,
            Err(err) => {
                context.errors.push(format!("invalid JSON: {err}"));
                return Ok(());
            },
        };

        if let Value::Object(map) = &value {
            if context.title.is_none() {
                context.title = TITLE_KEYS
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(ToString::to_string);
            }
            if context.description.is_none() {
                context.description = DESCRIPTION_KEYS
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(ToString::to_string);
            }
        }
        Ok(())
    }
}

/// Splits structurally, or as text when the document was flagged invalid.
struct SplitJson;

impl Middleware for SplitJson {
    fn name(&self) -> &'static str {
        "json-split"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let max_size = context.options.chunk_sizes.max_size;
        let splitter = JsonSplitter::new(max_size);
        let invalid = context.errors.iter().any(|e| e.starts_with("invalid JSON"));
        context.chunks = if invalid {
            crate::splitter::TextSplitter::new(max_size).split(&context.content)?
        } else {
            splitter.split(&context.content)?
        };
        Ok(())
    }
}
