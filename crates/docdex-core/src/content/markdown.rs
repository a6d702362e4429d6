//! Markdown processing: frontmatter metadata, links, semantic splitting.

use super::{ContentPipeline, Middleware, PipelineContext};
use crate::splitter::{optimize, ContentSplitter, MarkdownSplitter};
use crate::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Pipeline for native markdown content.
///
/// Content passes through unchanged; only metadata and links are extracted
/// before splitting.
pub struct MarkdownPipeline;

impl ContentPipeline for MarkdownPipeline {
    fn can_process(&self, mime_type: &str) -> bool {
        matches!(mime_type, "text/markdown" | "text/x-markdown")
    }

    fn middlewares(&self) -> Vec<Box<dyn Middleware>> {
        vec![
            Box::new(ExtractFrontmatter),
            Box::new(ExtractMarkdownLinks),
            Box::new(Split),
        ]
    }
}

/// Reads `title:`/`description:` out of a leading `---` frontmatter block,
/// falling back to the first H1 for the title. The content itself is left
/// untouched.
struct ExtractFrontmatter;

impl Middleware for ExtractFrontmatter {
    fn name(&self) -> &'static str {
        "markdown-frontmatter"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        if let Some(block) = frontmatter_block(&context.content) {
            for line in block.lines() {
                let Some((key, value)) = line.split_once(':') else {
                    continue;
                };
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if value.is_empty() {
                    continue;
                }
                match key.trim() {
                    "title" if context.title.is_none() => {
                        context.title = Some(value.to_string());
                    },
                    "description" if context.description.is_none() => {
                        context.description = Some(value.to_string());
                    },
                    _ => {},
                }
            }
        }

        if context.title.is_none() {
            context.title = first_heading(&context.content);
        }
        Ok(())
    }
}

fn frontmatter_block(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---\n")?;
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

fn first_heading(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let trimmed = line.trim_start();
        trimmed
            .strip_prefix("# ")
            .map(|title| title.trim().trim_end_matches('#').trim().to_string())
            .filter(|title| !title.is_empty())
    })
}

/// Collects inline and autolink targets, absolute-resolved against the page.
struct ExtractMarkdownLinks;

fn md_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]\(([^)\s]+)[^)]*\)|<(https?://[^>\s]+)>").unwrap())
}

impl Middleware for ExtractMarkdownLinks {
    fn name(&self) -> &'static str {
        "markdown-links"
    }

    fn run(&self, context: &mut PipelineContext<'_>) -> Result<()> {
        let base = Url::parse(&context.source).ok();
        for capture in md_link_re().captures_iter(&context.content) {
            let Some(href) = capture.get(1).or_else(|| capture.get(2)) else {
                continue;
            };
            let href = href.as_str();
            if href.starts_with('#') || href.starts_with("mailto:") {
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

/// Splits into semantic chunks and runs the greedy optimizer.
struct Split;

impl Middleware for Split {
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
