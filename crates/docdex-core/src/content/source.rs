//! Source-code processing: language detection and tree-sitter splitting.

use super::{ContentPipeline, Middleware, PipelineContext};
use crate::splitter::{ContentSplitter, SourceLanguage, SourceSplitter, TextSplitter};
use crate::Result;

/// MIME types routed to the source-code pipeline.
const SOURCE_MIMES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "text/x-typescript",
    "application/typescript",
    "text/x-python",
    "application/x-python-code",
    "text/x-script.python",
];

/// Pipeline for source files.
///
/// No conversion happens: the file text is chunked along declaration
/// boundaries, with unsupported languages and parse failures falling back to
/// line-based text splitting.
pub struct SourceCodePipeline;

impl ContentPipeline for SourceCodePipeline {
    fn can_process(&self, mime_type: &str) -> bool {
        SOURCE_MIMES.contains(&mime_type)
    }

    fn middlewares(&self) -> Vec<Box<dyn Middleware>> {
        vec![Box::new(SplitSource)]
    }
}

/// Extracts the file name and extension from a source URL path.
fn file_name_of(source: &str) -> (String, Option<String>) {
    let path = source
        .split(['?', '#'])
        .next()
        .unwrap_or(source)
        .trim_end_matches('/');
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_string());
    (name, extension)
}

struct SplitSource;

impl Middleware for SplitSource {
    fn name(&self) -> &'static str {
        "source-split"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let max_size = context.options.chunk_sizes.max_size;
        let (file_name, extension) = file_name_of(&context.source);

        let language = extension
            .as_deref()
            .and_then(SourceLanguage::from_extension);

        context.chunks = match language {
            Some(language) => {
                SourceSplitter::new(language, file_name, max_size).split(&context.content)?
            },
            None => {
                context
                    .errors
                    .push(format!("unsupported source language for '{file_name}'"));
                TextSplitter::new(max_size).split(&context.content)?
            },
        };
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::content::PipelineOptions;
    use crate::types::{FetchStatus, RawContent};

    fn raw(code: &str, source: &str, mime: &str) -> RawContent {
        RawContent {
            content: code.as_bytes().to_vec(),
            mime_type: mime.to_string(),
            charset: None,
            encoding: None,
            source: source.to_string(),
            etag: None,
            last_modified: None,
            status: FetchStatus::Success,
        }
    }

    #[test]
    fn test_typescript_file_chunked_by_declaration() {
        let code = "export class Svc {\n  run() {\n    return 1;\n  }\n}\n";
        let options = PipelineOptions::default();
        let result = SourceCodePipeline
            .process(
                &raw(code, "file:///src/svc.ts", "text/x-typescript"),
                &options,
            )
            .unwrap();
        let rebuilt: String = result.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, code);
        assert!(result
            .chunks
            .iter()
            .any(|c| c.section.path == vec!["svc.ts", "Svc", "run"]));
    }

    #[test]
    fn test_unknown_extension_falls_back_to_text() {
        let code = "some opaque script\n";
        let options = PipelineOptions::default();
        let result = SourceCodePipeline
            .process(
                &raw(code, "file:///src/tool.lua", "text/x-script.python"),
                &options,
            )
            .unwrap();
        // Mislabeled MIME with an unknown extension still degrades cleanly.
        assert!(result.errors.iter().any(|e| e.contains("unsupported")));
        let rebuilt: String = result.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, code);
    }

    #[test]
    fn test_file_name_extraction() {
        assert_eq!(
            file_name_of("https://example.com/a/b/app.tsx?x=1"),
            ("app.tsx".to_string(), Some("tsx".to_string()))
        );
        assert_eq!(
            file_name_of("file:///src/mod.py"),
            ("mod.py".to_string(), Some("py".to_string()))
        );
    }

    #[test]
    fn test_can_process() {
        assert!(SourceCodePipeline.can_process("text/javascript"));
        assert!(SourceCodePipeline.can_process("text/x-python"));
        assert!(!SourceCodePipeline.can_process("text/markdown"));
    }
}
