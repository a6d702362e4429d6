//! Structural JSON splitting.
//!
//! The splitter scans the raw JSON text (never a re-serialized value, so
//! indentation and commas survive verbatim) and records a cut after every
//! opening brace/bracket and comma, and before every closing brace/bracket,
//! within containers whose depth does not exceed `max_depth`. The byte
//! slices between cuts are the chunks: one minimal chunk per structural
//! token and per primitive property, concatenating back to the exact input.
//!
//! `path` starts at `["root"]` and extends with property names or `"[i]"`
//! array indices; `level == path.len()`.
//!
//! Two bounds guard pathological documents: subtrees below `max_depth`
//! (default 5) stay unsplit inside their parent chunk, and documents that
//! would produce more than `max_chunks` (default 1000) chunks fall back to
//! plain text splitting entirely.

use super::{ContentSplitter, TextSplitter};
use crate::types::Chunk;
use crate::Result;

/// Default maximum container depth that is split structurally.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Default maximum chunk count before falling back to text splitting.
pub const DEFAULT_MAX_CHUNKS: usize = 1000;

/// Structural splitter for JSON documents.
pub struct JsonSplitter {
    max_depth: usize,
    max_chunks: usize,
    text: TextSplitter,
    max_size: usize,
}

/// One cut-delimited region of the input.
struct Span {
    start: usize,
    end: usize,
    path: Vec<String>,
}

impl JsonSplitter {
    /// Creates a splitter with the given maximum chunk size and default
    /// depth/count bounds.
    #[must_use]
    pub const fn new(max_size: usize) -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_chunks: DEFAULT_MAX_CHUNKS,
            text: TextSplitter::new(max_size),
            max_size,
        }
    }

    /// Overrides the structural depth bound.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Overrides the chunk-count bound.
    #[must_use]
    pub const fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    /// Splits structurally, returning `None` when the chunk-count bound is
    /// exceeded and the document should be treated as plain text.
    #[must_use]
    pub fn try_split(&self, content: &str) -> Option<Vec<Chunk>> {
        let spans = self.scan(content)?;
        let mut chunks = Vec::new();
        for span in spans {
            let text = &content[span.start..span.end];
            let level = u32::try_from(span.path.len()).unwrap_or(u32::MAX);
            if text.chars().count() > self.max_size {
                self.split_oversized(text, level, &span.path, &mut chunks);
            } else {
                chunks.push(Chunk {
                    types: vec!["json".to_string()],
                    content: text.to_string(),
                    section: crate::types::Section {
                        level,
                        path: span.path.clone(),
                    },
                });
            }
            if chunks.len() > self.max_chunks {
                return None;
            }
        }
        Some(chunks)
    }

    /// Delegates an oversized primitive property to the text splitter: the
    /// property prefix is emitted once, the value spreads across the
    /// successor chunks.
    fn split_oversized(&self, text: &str, level: u32, path: &[String], out: &mut Vec<Chunk>) {
        let value_start = property_value_offset(text);
        let (prefix, value) = text.split_at(value_start);
        let mut pieces = self.text.split_text(value).into_iter();
        let first = pieces.next().unwrap_or_default();
        out.push(Chunk {
            types: vec!["json".to_string()],
            content: format!("{prefix}{first}"),
            section: crate::types::Section {
                level,
                path: path.to_vec(),
            },
        });
        for piece in pieces {
            out.push(Chunk {
                types: vec!["json".to_string()],
                content: piece,
                section: crate::types::Section {
                    level,
                    path: path.to_vec(),
                },
            });
        }
    }

    /// Scans the document, producing cut-delimited spans with their paths.
    ///
    /// Returns `None` when the span count exceeds `max_chunks`.
    #[allow(clippy::too_many_lines)]
    fn scan(&self, content: &str) -> Option<Vec<Span>> {
        let bytes = content.as_bytes();
        let mut spans: Vec<Span> = Vec::new();
        let mut span_start = 0usize;

        // Container state: per-frame (is_object, next array index, interior
        // splitting active) plus the path segments entered so far.
        let mut frames: Vec<(bool, usize, bool)> = Vec::new();
        let mut path: Vec<String> = Vec::new();
        let mut expect_key = false;
        let mut pending_key: Option<String> = None;
        let mut member_label: Option<Vec<String>> = None;

        let mut cut = |spans: &mut Vec<Span>, span_start: &mut usize, end: usize, label: Vec<String>| {
            if end > *span_start {
                spans.push(Span {
                    start: *span_start,
                    end,
                    path: label,
                });
            }
            *span_start = end;
        };

        let mut i = 0usize;
        while i < bytes.len() {
            let b = bytes[i];
            let active = frames.last().is_some_and(|(_, _, a)| *a);
            match b {
                b'"' => {
                    let end = scan_string(bytes, i);
                    if active && member_label.is_none() {
                        if expect_key {
                            pending_key = Some(content[i + 1..end - 1].to_string());
                            expect_key = false;
                        } else if let Some((false, index, _)) = frames.last() {
                            let mut label = path.clone();
                            label.push(format!("[{index}]"));
                            member_label = Some(label);
                        }
                    }
                    i = end;
                    continue;
                },
                b':' => {
                    if active {
                        if let Some(key) = pending_key.take() {
                            let mut label = path.clone();
                            label.push(key);
                            member_label = Some(label);
                        }
                    }
                },
                b'{' | b'[' => {
                    let segment = if frames.is_empty() {
                        "root".to_string()
                    } else if frames.last().is_some_and(|(is_obj, _, _)| *is_obj) {
                        pending_key
                            .take()
                            .or_else(|| member_label.as_ref().and_then(|l| l.last().cloned()))
                            .unwrap_or_default()
                    } else {
                        let index = frames.last().map_or(0, |(_, idx, _)| *idx);
                        format!("[{index}]")
                    };
                    let interior_active = frames.len() < self.max_depth;
                    path.push(segment);
                    frames.push((b == b'{', 0, interior_active));
                    if interior_active {
                        cut(&mut spans, &mut span_start, i + 1, path.clone());
                        member_label = None;
                    }
                    expect_key = b == b'{';
                },
                b'}' | b']' => {
                    let closing_active = frames.last().is_some_and(|(_, _, a)| *a);
                    if closing_active {
                        let label = member_label.take().unwrap_or_else(|| path.clone());
                        cut(&mut spans, &mut span_start, i, label);
                        member_label = Some(path.clone());
                    }
                    frames.pop();
                    path.pop();
                    expect_key = false;
                },
                b',' => {
                    if active {
                        let label = member_label.take().unwrap_or_else(|| path.clone());
                        cut(&mut spans, &mut span_start, i + 1, label);
                    }
                    if let Some((is_obj, index, _)) = frames.last_mut() {
                        if *is_obj {
                            expect_key = true;
                        } else {
                            *index += 1;
                        }
                    }
                },
                _ => {
                    // Primitive value start inside an active array marks the
                    // member label; everything else just accumulates.
                    if active
                        && !b.is_ascii_whitespace()
                        && member_label.is_none()
                        && frames.last().is_some_and(|(is_obj, _, _)| !*is_obj)
                    {
                        let index = frames.last().map_or(0, |(_, idx, _)| *idx);
                        let mut label = path.clone();
                        label.push(format!("[{index}]"));
                        member_label = Some(label);
                    }
                },
            }
            if spans.len() > self.max_chunks {
                return None;
            }
            i += 1;
        }

        if span_start < bytes.len() {
            let label = member_label.unwrap_or_else(|| vec!["root".to_string()]);
            spans.push(Span {
                start: span_start,
                end: bytes.len(),
                path: label,
            });
        }
        if spans.len() > self.max_chunks {
            return None;
        }
        Some(spans)
    }
}

impl ContentSplitter for JsonSplitter {
    fn split(&self, content: &str) -> Result<Vec<Chunk>> {
        match self.try_split(content) {
            Some(chunks) => Ok(chunks),
            None => self.text.split(content),
        }
    }
}

/// Advances past a JSON string starting at `start` (which must index a `"`),
/// returning the offset just past the closing quote.
fn scan_string(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Offset where a property's value begins: just past the top-level colon,
/// or 0 when the span is not a key/value pair.
fn property_value_offset(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = scan_string(bytes, i),
            b':' => {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                return i;
            },
            _ => i += 1,
        }
    }
    0
}
