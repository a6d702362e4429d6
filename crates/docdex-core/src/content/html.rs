//! HTML processing: metadata, links, sanitization, markdown conversion.

use super::{ContentPipeline, Middleware, PipelineContext};
use crate::splitter::{optimize, ContentSplitter, MarkdownSplitter};
use crate::{Error, Result};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Pipeline for `text/html` content.
///
/// Middleware order: metadata extraction, link extraction, sanitization,
/// markdown conversion, markdown splitting. On success `content_type`
/// becomes `text/markdown`, so downstream consumers treat converted pages
/// and native markdown identically.
pub struct HtmlPipeline;

impl ContentPipeline for HtmlPipeline {
    fn can_process(&self, mime_type: &str) -> bool {
        matches!(mime_type, "text/html" | "application/xhtml+xml")
    }

    fn middlewares(&self) -> Vec<Box<dyn Middleware>> {
        vec![
            Box::new(ExtractMetadata),
            Box::new(ExtractLinks),
            Box::new(Sanitize),
            Box::new(ConvertToMarkdown),
            Box::new(SplitMarkdown),
        ]
    }
}

fn selector(css: &'static str) -> Selector {
    #[allow(clippy::unwrap_used)] // selectors are compile-time constants
    Selector::parse(css).unwrap()
}

/// Extracts `<title>` and the meta description.
struct ExtractMetadata;

impl Middleware for ExtractMetadata {
    fn name(&self) -> &'static str {
        "html-metadata"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let document = Html::parse_document(&context.content);

        if let Some(title) = document.select(&selector("title")).next() {
            let text: String = title.text().collect();
            let text = text.trim();
            if !text.is_empty() {
                context.title = Some(text.to_string());
            }
        }

        if let Some(meta) = document
            .select(&selector(r#"meta[name="description"]"#))
            .next()
        {
            if let Some(description) = meta.value().attr("content") {
                let description = description.trim();
                if !description.is_empty() {
                    context.description = Some(description.to_string());
                }
            }
        }
        Ok(())
    }
}

/// Extracts `a[href]` targets, absolute-resolved against the page URL.
struct ExtractLinks;

impl Middleware for ExtractLinks {
    fn name(&self) -> &'static str {
        "html-links"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let document = Html::parse_document(&context.content);
        let base = Url::parse(&context.source).ok();

        for anchor in document.select(&selector("a[href]")) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("mailto:")
                || href.starts_with("javascript:")
            {
                continue;
            }
            let resolved = match &base {
                Some(base) => base.join(href).ok(),
                None => Url::parse(href).ok(),
            };
            if let Some(mut url) = resolved {
                url.set_fragment(None);
                let url = url.to_string();
                if !context.links.contains(&url) {
                    context.links.push(url);
                }
            }
        }
        Ok(())
    }
}

/// Drops script/style subtrees and scrubs script-bearing attributes.
struct Sanitize;

fn on_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r#"(?i)\son\w+\s*=\s*("[^"]*"|'[^']*')"#).unwrap())
}

fn js_href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r#"(?i)href\s*=\s*("javascript:[^"]*"|'javascript:[^']*')"#).unwrap())
}

impl Middleware for Sanitize {
    fn name(&self) -> &'static str {
        "html-sanitize"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let mut document = Html::parse_document(&context.content);
        let unsafe_nodes: Vec<_> = document
            .select(&selector("script, style, noscript, iframe, object, embed"))
            .map(|element| element.id())
            .collect();
        for id in unsafe_nodes {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
        let serialized = document.root_element().html();
        let scrubbed = on_attr_re().replace_all(&serialized, "");
        let scrubbed = js_href_re().replace_all(&scrubbed, r##"href="#""##);
        context.content = scrubbed.into_owned();
        Ok(())
    }
}

/// Converts the sanitized HTML into markdown and updates the content type.
struct ConvertToMarkdown;

impl Middleware for ConvertToMarkdown {
    fn name(&self) -> &'static str {
        "html-to-markdown"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let converter = htmd::HtmlToMarkdown::builder()
            .skip_tags(vec!["script", "style", "head"])
            .build();
        match converter.convert(&context.content) {
            Ok(markdown) => {
                context.content = markdown;
                context.content_type = "text/markdown".to_string();
            },
            Err(err) => {
                // Conversion failure is survivable: keep the sanitized HTML
                // and let the split stage treat it as text.
                context
                    .errors
                    .push(format!("markdown conversion failed: {err}"));
            },
        }
        Ok(())
    }
}

/// Splits the converted markdown into optimized chunks.
struct SplitMarkdown;

impl Middleware for SplitMarkdown {
    fn name(&self) -> &'static str {
        "markdown-split"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let splitter = MarkdownSplitter::new()
            .map_err(|e| Error::Parse(format!("markdown splitter init failed: {e}")))?;
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

    fn raw(html: &str, source: &str) -> RawContent {
        RawContent {
            content: html.as_bytes().to_vec(),
            mime_type: "text/html".to_string(),
            charset: Some("utf-8".to_string()),
            encoding: None,
            source: source.to_string(),
            etag: Some("\"e1\"".to_string()),
            last_modified: None,
            status: FetchStatus::Success,
        }
    }

    #[test]
    fn test_full_pipeline_extracts_and_converts() {
        let html = r#"<html><head><title>Guide</title>
            <meta name="description" content="A guide."></head>
            <body><h1>Guide</h1><p>Read <a href="/docs/next">next</a>.</p>
            <script>alert(1)</script></body></html>"#;
        let options = PipelineOptions::default();
        let result = HtmlPipeline
            .process(&raw(html, "https://example.com/docs/guide"), &options)
            .unwrap();

        assert_eq!(result.title.as_deref(), Some("Guide"));
        assert_eq!(result.content_type, "text/markdown");
        assert!(result.text_content.contains("# Guide"));
        assert!(!result.text_content.contains("alert"));
        assert_eq!(result.links, vec!["https://example.com/docs/next"]);
        assert!(!result.chunks.is_empty());
        assert_eq!(result.etag.as_deref(), Some("\"e1\""));
    }

    #[test]
    fn test_links_are_absolute_and_deduped() {
        let html = r##"<body>
            <a href="a.html">one</a>
            <a href="a.html">again</a>
            <a href="https://other.example.com/x">abs</a>
            <a href="#frag">skip</a>
            <a href="mailto:x@y.z">skip</a>
            <a href="javascript:void(0)">skip</a>
        </body>"##;
        let options = PipelineOptions::default();
        let result = HtmlPipeline
            .process(&raw(html, "https://example.com/docs/"), &options)
            .unwrap();
        assert_eq!(
            result.links,
            vec![
                "https://example.com/docs/a.html",
                "https://other.example.com/x"
            ]
        );
    }

    #[test]
    fn test_event_handlers_scrubbed() {
        let html = r#"<body><div onclick="steal()">content here</div></body>"#;
        let options = PipelineOptions::default();
        let result = HtmlPipeline
            .process(&raw(html, "https://example.com/"), &options)
            .unwrap();
        assert!(!result.text_content.contains("steal"));
        assert!(result.text_content.contains("content here"));
    }

    #[test]
    fn test_can_process() {
        assert!(HtmlPipeline.can_process("text/html"));
        assert!(HtmlPipeline.can_process("application/xhtml+xml"));
        assert!(!HtmlPipeline.can_process("text/markdown"));
    }
}
