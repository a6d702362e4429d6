//! Semantic markdown splitting using tree-sitter.
//!
//! The splitter walks the tree-sitter markdown block grammar and records an
//! emission boundary at every heading and every structural block (paragraph,
//! fenced code, table, list, quote). Chunks are byte slices of the input
//! between consecutive boundaries, so blank lines between blocks stay
//! attached to the preceding chunk and concatenation is byte-exact.
//!
//! `level` is the conceptual depth of the enclosing section (headings build
//! a stack, so a well-formed `#`/`##`/`###` document has `level ==
//! path.len()`); `path` is the heading-title ancestry including the current
//! section. Content before the first heading carries `{level: 0, path: []}`.

use super::ContentSplitter;
use crate::types::{Chunk, Section};
use crate::{Error, Result};
use tree_sitter::{Node, Parser};

/// One emission boundary discovered during the tree walk.
struct Boundary {
    start: usize,
    section: Section,
    kind: &'static str,
}

/// Tree-sitter based semantic splitter for markdown documents.
pub struct MarkdownSplitter {
    parser: std::cell::RefCell<Parser>,
}

impl MarkdownSplitter {
    /// Creates a new markdown splitter.
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_md::LANGUAGE.into())
            .map_err(|e| Error::Parse(format!("Failed to set markdown language: {e}")))?;
        Ok(Self {
            parser: std::cell::RefCell::new(parser),
        })
    }

    fn collect(content: &str, node: Node<'_>, stack: &mut Vec<(u8, String)>, out: &mut Vec<Boundary>) {
        for child in node.named_children(&mut node.walk()) {
            match child.kind() {
                "section" => Self::collect(content, child, stack, out),
                "atx_heading" | "setext_heading" => {
                    let depth = heading_depth(content, child);
                    let title = heading_title(content, child);
                    while stack.last().is_some_and(|(d, _)| *d >= depth) {
                        stack.pop();
                    }
                    stack.push((depth, title));
                    out.push(Boundary {
                        start: child.start_byte(),
                        section: section_of(stack),
                        kind: "heading",
                    });
                },
                "fenced_code_block" | "indented_code_block" => out.push(Boundary {
                    start: child.start_byte(),
                    section: section_of(stack),
                    kind: "code",
                }),
                "pipe_table" => out.push(Boundary {
                    start: child.start_byte(),
                    section: section_of(stack),
                    kind: "table",
                }),
                _ => out.push(Boundary {
                    start: child.start_byte(),
                    section: section_of(stack),
                    kind: "block",
                }),
            }
        }
    }
}

impl ContentSplitter for MarkdownSplitter {
    fn split(&self, content: &str) -> Result<Vec<Chunk>> {
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let tree = self
            .parser
            .borrow_mut()
            .parse(content, None)
            .ok_or_else(|| Error::Parse("tree-sitter markdown parse failed".to_string()))?;

        let mut stack: Vec<(u8, String)> = Vec::new();
        let mut boundaries = Vec::new();
        Self::collect(content, tree.root_node(), &mut stack, &mut boundaries);
        boundaries.sort_by_key(|b| b.start);
        boundaries.dedup_by_key(|b| b.start);

        let mut chunks = Vec::new();
        if boundaries.is_empty() {
            chunks.push(make_chunk(content, Section::default(), "block"));
            return Ok(chunks);
        }

        if boundaries[0].start > 0 {
            chunks.push(make_chunk(
                &content[..boundaries[0].start],
                Section::default(),
                "block",
            ));
        }

        for (i, boundary) in boundaries.iter().enumerate() {
            let end = boundaries
                .get(i + 1)
                .map_or(content.len(), |next| next.start);
            if end > boundary.start {
                chunks.push(make_chunk(
                    &content[boundary.start..end],
                    boundary.section.clone(),
                    boundary.kind,
                ));
            }
        }

        Ok(chunks)
    }
}

fn make_chunk(content: &str, section: Section, kind: &'static str) -> Chunk {
    let types = if kind == "block" {
        vec!["markdown".to_string()]
    } else {
        vec!["markdown".to_string(), kind.to_string()]
    };
    Chunk {
        types,
        content: content.to_string(),
        section,
    }
}

fn section_of(stack: &[(u8, String)]) -> Section {
    Section {
        level: u32::try_from(stack.len()).unwrap_or(u32::MAX),
        path: stack.iter().map(|(_, title)| title.clone()).collect(),
    }
}

fn heading_depth(content: &str, node: Node<'_>) -> u8 {
    let text = &content[node.byte_range()];
    if node.kind() == "setext_heading" {
        let underline = text.lines().last().unwrap_or_default().trim_start();
        return if underline.starts_with('=') { 1 } else { 2 };
    }
    let hashes = text.trim_start().chars().take_while(|c| *c == '#').count();
    u8::try_from(hashes.clamp(1, 6)).unwrap_or(6)
}

fn heading_title(content: &str, node: Node<'_>) -> String {
    let text = &content[node.byte_range()];
    if node.kind() == "setext_heading" {
        return text.lines().next().unwrap_or_default().trim().to_string();
    }
    text.trim_start()
        .trim_start_matches('#')
        .trim()
        .trim_end_matches('#')
        .trim()
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::assert_reconstructs;
    use super::*;

    fn split(content: &str) -> Vec<Chunk> {
        MarkdownSplitter::new().unwrap().split(content).unwrap()
    }

    #[test]
    fn test_heading_hierarchy_paths() {
        let content = "# Chapter\n\nIntro text.\n\n## Section\n\nBody text.\n";
        let chunks = split(content);
        assert_reconstructs(content, &chunks);

        let heading_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| c.types.iter().any(|t| t == "heading"))
            .collect();
        assert_eq!(heading_chunks.len(), 2);
        assert_eq!(heading_chunks[0].section.path, vec!["Chapter"]);
        assert_eq!(heading_chunks[0].section.level, 1);
        assert_eq!(heading_chunks[1].section.path, vec!["Chapter", "Section"]);
        assert_eq!(heading_chunks[1].section.level, 2);

        // Body paragraphs inherit the enclosing section.
        let body = chunks
            .iter()
            .find(|c| c.content.contains("Body text"))
            .unwrap();
        assert_eq!(body.section.path, vec!["Chapter", "Section"]);
    }

    #[test]
    fn test_preamble_is_level_zero() {
        let content = "Loose preamble.\n\n# Title\n\nContent.\n";
        let chunks = split(content);
        assert_reconstructs(content, &chunks);
        assert_eq!(chunks[0].section.level, 0);
        assert!(chunks[0].section.path.is_empty());
        assert!(chunks[0].content.contains("Loose preamble"));
    }

    #[test]
    fn test_sibling_sections_pop_stack() {
        let content = "# A\n\n## A1\n\ntext\n\n# B\n\nmore\n";
        let chunks = split(content);
        assert_reconstructs(content, &chunks);
        let b_heading = chunks
            .iter()
            .find(|c| c.content.starts_with("# B"))
            .unwrap();
        assert_eq!(b_heading.section.path, vec!["B"]);
        assert_eq!(b_heading.section.level, 1);
    }

    #[test]
    fn test_code_fence_and_table_tagged() {
        let content = "# T\n\n```rust\nfn main() {}\n```\n\n| a | b |\n| - | - |\n| 1 | 2 |\n";
        let chunks = split(content);
        assert_reconstructs(content, &chunks);
        assert!(chunks
            .iter()
            .any(|c| c.types.iter().any(|t| t == "code") && c.content.contains("fn main")));
        assert!(chunks
            .iter()
            .any(|c| c.types.iter().any(|t| t == "table") && c.content.contains("| a | b |")));
    }

    #[test]
    fn test_level_matches_path_len_for_wellformed_docs() {
        let content = "# A\n\n## B\n\n### C\n\ndeep text\n\n## D\n\nmore\n";
        let chunks = split(content);
        for chunk in &chunks {
            assert_eq!(
                chunk.section.level as usize,
                chunk.section.path.len(),
                "level/path mismatch in {:?}",
                chunk.section
            );
        }
    }

    #[test]
    fn test_no_headings_single_context() {
        let content = "just a paragraph\n\nand another\n";
        let chunks = split(content);
        assert_reconstructs(content, &chunks);
        for chunk in &chunks {
            assert_eq!(chunk.section.level, 0);
            assert!(chunk.section.path.is_empty());
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(split("").is_empty());
    }

    #[test]
    fn test_setext_heading_depth() {
        let content = "Title\n=====\n\nbody\n\nSub\n---\n\nmore\n";
        let chunks = split(content);
        assert_reconstructs(content, &chunks);
        let title = chunks
            .iter()
            .find(|c| c.content.starts_with("Title"))
            .unwrap();
        assert_eq!(title.section.path, vec!["Title"]);
        assert_eq!(title.section.level, 1);
        let sub = chunks.iter().find(|c| c.content.starts_with("Sub")).unwrap();
        assert_eq!(sub.section.path, vec!["Title", "Sub"]);
        assert_eq!(sub.section.level, 2);
    }
}
