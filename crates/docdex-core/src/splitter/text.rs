//! Hierarchical fallback splitter over unstructured text.
//!
//! Splitting proceeds through progressively finer boundaries: paragraph
//! breaks (`\n\s*\n`), line breaks, word breaks, and finally fixed-size
//! character runs. Separators stay attached to the segment they terminate,
//! so concatenating the output reproduces the input exactly, whitespace
//! included.

use super::ContentSplitter;
use crate::types::Chunk;
use crate::Result;
use regex::Regex;
use std::sync::OnceLock;

/// Boundary tiers, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Paragraph,
    Line,
    Word,
    Char,
}

impl Tier {
    const fn finer(self) -> Self {
        match self {
            Self::Paragraph => Self::Line,
            Self::Line => Self::Word,
            Self::Word | Self::Char => Self::Char,
        }
    }
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    RE.get_or_init(|| Regex::new(r"\n\s*\n").unwrap())
}

/// Line-based fallback splitter with exact whitespace preservation.
///
/// All chunks carry `{level: 0, path: []}`: text has no structure to
/// navigate. The only inputs that defeat boundary search are single tokens
/// longer than the maximum chunk size; those are forcibly split on character
/// boundaries.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    max_size: usize,
}

impl TextSplitter {
    /// Creates a splitter with the given maximum chunk size in characters.
    #[must_use]
    pub const fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Splits `content` into strings, each at most `max_size` characters.
    ///
    /// This is the raw form used by other splitters when delegating
    /// oversized fragments.
    #[must_use]
    pub fn split_text(&self, content: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        self.split_tier(content, Tier::Paragraph, &mut pieces);
        pieces
    }

    fn split_tier(&self, content: &str, tier: Tier, out: &mut Vec<String>) {
        if char_len(content) <= self.max_size {
            if !content.is_empty() {
                out.push(content.to_string());
            }
            return;
        }

        if tier == Tier::Char {
            self.split_chars(content, out);
            return;
        }

        let segments = segment(content, tier);
        if segments.len() <= 1 {
            self.split_tier(content, tier.finer(), out);
            return;
        }

        // Greedy packing: fill each chunk up to max_size, recursing into
        // segments that alone exceed it.
        let mut current = String::new();
        let mut current_len = 0usize;
        for seg in segments {
            let seg_len = char_len(seg);
            if seg_len > self.max_size {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                self.split_tier(seg, tier.finer(), out);
            } else if current_len + seg_len <= self.max_size {
                current.push_str(seg);
                current_len += seg_len;
            } else {
                out.push(std::mem::take(&mut current));
                current.push_str(seg);
                current_len = seg_len;
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
    }

    fn split_chars(&self, content: &str, out: &mut Vec<String>) {
        let mut current = String::new();
        let mut count = 0usize;
        for ch in content.chars() {
            if count == self.max_size {
                out.push(std::mem::take(&mut current));
                count = 0;
            }
            current.push(ch);
            count += 1;
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
}

impl ContentSplitter for TextSplitter {
    fn split(&self, content: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .split_text(content)
            .into_iter()
            .map(|piece| Chunk::new("text", piece, 0, Vec::new()))
            .collect())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cuts `content` into an exact cover of segments at the given tier, each
/// segment keeping its trailing separator.
fn segment(content: &str, tier: Tier) -> Vec<&str> {
    match tier {
        Tier::Paragraph => {
            let mut segments = Vec::new();
            let mut start = 0;
            for m in paragraph_re().find_iter(content) {
                segments.push(&content[start..m.end()]);
                start = m.end();
            }
            if start < content.len() {
                segments.push(&content[start..]);
            }
            segments
        },
        Tier::Line => content.split_inclusive('\n').collect(),
        Tier::Word => {
            // A segment is one run of non-whitespace plus the whitespace
            // that follows it.
            let mut segments = Vec::new();
            let mut start = 0;
            let mut in_ws = content.starts_with(char::is_whitespace);
            for (idx, ch) in content.char_indices() {
                let ws = ch.is_whitespace();
                if in_ws && !ws && idx > start {
                    segments.push(&content[start..idx]);
                    start = idx;
                }
                in_ws = ws;
            }
            if start < content.len() {
                segments.push(&content[start..]);
            }
            segments
        },
        Tier::Char => vec![content],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::assert_reconstructs;
    use super::*;

    #[test]
    fn test_short_content_is_one_chunk() {
        let splitter = TextSplitter::new(100);
        let chunks = splitter.split("short text").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "short text");
        assert_eq!(chunks[0].section.level, 0);
        assert!(chunks[0].section.path.is_empty());
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let splitter = TextSplitter::new(30);
        let content = "first paragraph here\n\nsecond paragraph here\n\nthird one";
        let chunks = splitter.split(content).unwrap();
        assert!(chunks.len() >= 2);
        assert_reconstructs(content, &chunks);
        // Paragraph separators stay attached to the preceding chunk.
        assert!(chunks[0].content.ends_with("\n\n"));
    }

    #[test]
    fn test_line_fallback_when_paragraph_too_big() {
        let splitter = TextSplitter::new(20);
        let content = "line one is long here\nline two is also long\nline three";
        let chunks = splitter.split(content).unwrap();
        assert!(chunks.len() >= 2);
        assert_reconstructs(content, &chunks);
    }

    #[test]
    fn test_word_fallback_for_long_single_line() {
        let splitter = TextSplitter::new(12);
        let content = "alpha beta gamma delta epsilon zeta";
        let chunks = splitter.split(content).unwrap();
        assert!(chunks.len() > 1);
        assert_reconstructs(content, &chunks);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 12);
        }
    }

    #[test]
    fn test_forced_char_split_for_unsplittable_token() {
        let splitter = TextSplitter::new(10);
        let content = "a".repeat(35);
        let chunks = splitter.split(&content).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_reconstructs(&content, &chunks);
        assert_eq!(chunks[0].content.len(), 10);
        assert_eq!(chunks[3].content.len(), 5);
    }

    #[test]
    fn test_whitespace_only_content_preserved() {
        let splitter = TextSplitter::new(5);
        let content = "   \n\n \n\t\t  \n\n   ";
        let chunks = splitter.split(content).unwrap();
        assert_reconstructs(content, &chunks);
    }

    #[test]
    fn test_multibyte_content_splits_on_char_boundaries() {
        let splitter = TextSplitter::new(4);
        let content = "héllo wörld ünïcode";
        let chunks = splitter.split(content).unwrap();
        assert_reconstructs(content, &chunks);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 4);
        }
    }

    #[test]
    fn test_empty_content_yields_no_chunks() {
        let splitter = TextSplitter::new(10);
        assert!(splitter.split("").unwrap().is_empty());
    }

    #[test]
    fn test_mixed_document_reconstruction() {
        let splitter = TextSplitter::new(50);
        let content = "Intro paragraph with some words.\n\n  Indented follow-up.\n\nA much longer paragraph that will not fit into a single chunk because it keeps going on and on with filler words.\n";
        let chunks = splitter.split(content).unwrap();
        assert_reconstructs(content, &chunks);
    }
}
