//! Content-aware assembly of matched chunks into readable regions.
//!
//! Strategy selection follows the page's MIME type:
//!
//! - **Broad context** (markdown, HTML, plain text, and the default for
//!   anything unrecognized): each match pulls in its parent, up to two
//!   preceding and two following siblings, and up to five children, joined
//!   with blank lines in document order.
//! - **Hierarchical** (source code, JSON, structured config): each match
//!   walks up to its structural root and the region is every descendant of
//!   that root in document order, plainly concatenated; the splitters
//!   guarantee seamless joins.
//!
//! Within one page, overlapping regions collapse: chunks are deduplicated
//! by id and the region keeps the best match score.

use super::SearchMatch;
use crate::store::{Store, StoredChunk};
use crate::Result;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Sibling window on each side of a match in broad-context assembly.
const SIBLING_WINDOW: usize = 2;

/// Maximum children included per match in broad-context assembly.
const CHILD_LIMIT: usize = 5;

/// MIME types assembled hierarchically.
fn is_hierarchical(content_type: &str) -> bool {
    matches!(
        content_type,
        "application/json" | "text/json"
    ) || content_type.ends_with("+json")
        || content_type == "text/javascript"
        || content_type == "application/javascript"
        || content_type == "text/x-typescript"
        || content_type == "application/typescript"
        || content_type == "text/x-python"
        || content_type == "application/x-python-code"
        || content_type == "text/yaml"
        || content_type == "application/toml"
}

/// Assembles scored chunk ids into per-page regions.
pub fn assemble(store: &Arc<Store>, scored: &[(i64, f64)]) -> Result<Vec<SearchMatch>> {
    let ids: Vec<i64> = scored.iter().map(|(id, _)| *id).collect();
    let matched = store.get_chunks(&ids)?;
    let score_of: BTreeMap<i64, f64> = scored.iter().copied().collect();

    // Group matches per page, preserving the best score per page region.
    let mut by_page: BTreeMap<i64, Vec<StoredChunk>> = BTreeMap::new();
    for chunk in matched {
        by_page.entry(chunk.page_id).or_default().push(chunk);
    }

    let mut results = Vec::new();
    for (page_id, matches) in by_page {
        let page = store.get_page(page_id)?;
        let all = store.get_page_chunks(page_id)?;
        if all.is_empty() {
            continue;
        }
        let content_type = page.content_type.clone().unwrap_or_default();

        let (selected, join) = if is_hierarchical(&content_type) {
            (hierarchical_selection(&all, &matches), "")
        } else {
            (broad_selection(&all, &matches), "\n\n")
        };

        let score = matches
            .iter()
            .filter_map(|m| score_of.get(&m.id))
            .fold(0.0f64, |acc, s| acc.max(*s));

        let content = selected
            .iter()
            .map(|chunk| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(join);

        results.push(SearchMatch {
            url: page.url,
            title: page.title,
            content_type,
            content,
            score,
        });
    }

    // Page regions come out in page-id order; present best-first.
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(results)
}

/// Broad-context selection: parent, sibling window, children per match.
fn broad_selection<'a>(all: &'a [StoredChunk], matches: &[StoredChunk]) -> Vec<&'a StoredChunk> {
    let mut selected: HashSet<i64> = HashSet::new();

    for matched in matches {
        let position = all.iter().position(|c| c.id == matched.id);
        let Some(position) = position else { continue };
        selected.insert(matched.id);

        // Parent: nearest preceding chunk whose path is a proper prefix of
        // the match's path.
        if let Some(parent) = all[..position]
            .iter()
            .rev()
            .find(|c| is_proper_prefix(&c.metadata.path, &matched.metadata.path))
        {
            selected.insert(parent.id);
        }

        // Siblings: same path, nearest first, two on each side.
        let mut preceding = 0usize;
        for candidate in all[..position].iter().rev() {
            if preceding == SIBLING_WINDOW {
                break;
            }
            if candidate.metadata.path == matched.metadata.path {
                selected.insert(candidate.id);
                preceding += 1;
            }
        }
        let mut following = 0usize;
        for candidate in &all[position + 1..] {
            if following == SIBLING_WINDOW {
                break;
            }
            if candidate.metadata.path == matched.metadata.path {
                selected.insert(candidate.id);
                following += 1;
            }
        }

        // Children: immediate descendants in document order.
        let mut children = 0usize;
        for candidate in &all[position + 1..] {
            if children == CHILD_LIMIT {
                break;
            }
            if candidate.metadata.path.len() == matched.metadata.path.len() + 1
                && is_proper_prefix(&matched.metadata.path, &candidate.metadata.path)
            {
                selected.insert(candidate.id);
                children += 1;
            }
        }
    }

    all.iter().filter(|c| selected.contains(&c.id)).collect()
}

/// Hierarchical selection: every descendant of each match's structural root.
fn hierarchical_selection<'a>(
    all: &'a [StoredChunk],
    matches: &[StoredChunk],
) -> Vec<&'a StoredChunk> {
    let mut selected: HashSet<i64> = HashSet::new();

    for matched in matches {
        // The structural root is the outermost enclosing element below the
        // document root: for code `[file, TopDecl]`, for JSON
        // `[root, property]`. A match at the document root selects the
        // whole page.
        let root_len = matched.metadata.path.len().min(2);
        let root_prefix = &matched.metadata.path[..root_len];

        for candidate in all {
            let candidate_prefix: &[String] = candidate
                .metadata
                .path
                .get(..root_len)
                .unwrap_or(&candidate.metadata.path);
            if candidate_prefix == root_prefix {
                selected.insert(candidate.id);
            }
        }
    }

    all.iter().filter(|c| selected.contains(&c.id)).collect()
}

fn is_proper_prefix(shorter: &[String], longer: &[String]) -> bool {
    shorter.len() < longer.len() && longer[..shorter.len()] == *shorter
}
