//! Hierarchical content splitters.
//!
//! Every splitter produces [`Chunk`]s such that concatenating a document's
//! chunks in emission order reconstructs the splitter input byte-for-byte.
//! Splitters assign each chunk a `{level, path}` hierarchy used by retrieval
//! for context expansion:
//!
//! - [`MarkdownSplitter`] (semantic): one chunk per heading boundary and
//!   per structural block, path is the heading ancestry.
//! - [`JsonSplitter`] (structural): one minimal chunk per structural token
//!   and primitive property, path rooted at `["root"]`.
//! - [`SourceSplitter`] (tree-sitter): declaration boundaries for supported
//!   languages, path rooted at the file name.
//! - [`TextSplitter`] (fallback): paragraph, then line, then word
//!   boundaries, preserving all whitespace.
//!
//! The [`optimize`](crate::splitter::optimize) pass merges small adjacent
//! chunks from the markdown and text splitters; source and JSON output is
//! never merged because structural fidelity overrides compression there.

mod json;
mod markdown;
pub mod optimize;
mod source;
mod text;

pub use json::JsonSplitter;
pub use markdown::MarkdownSplitter;
pub use source::{SourceLanguage, SourceSplitter};
pub use text::TextSplitter;

use crate::types::Chunk;
use crate::Result;

/// A strategy for splitting one document into hierarchical chunks.
pub trait ContentSplitter {
    /// Splits `content` into chunks whose concatenation equals `content`.
    fn split(&self, content: &str) -> Result<Vec<Chunk>>;
}

/// Asserts the reconstruction property in tests.
#[cfg(test)]
pub(crate) fn assert_reconstructs(original: &str, chunks: &[Chunk]) {
    let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(rebuilt, original, "chunks must concatenate to the original");
}
