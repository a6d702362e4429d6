//! Greedy chunk merging.
//!
//! A universal post-pass over markdown and text chunks that merges small
//! adjacent chunks within the configured size bounds. Merging respects
//! section structure: once the accumulating chunk has reached the preferred
//! size it never absorbs a chunk that opens a new H1/H2 section. Source and
//! JSON chunks are not optimized; structural fidelity overrides compression
//! there.
//!
//! Merge semantics for the section of a combined chunk:
//! - levels: the lower (more general) level wins;
//! - identical paths stay unchanged;
//! - a parent/child pair keeps the deeper path;
//! - siblings collapse to their longest common prefix;
//! - unrelated paths collapse to the empty path.

use crate::config::ChunkSizes;
use crate::types::{Chunk, Section};

/// Merges adjacent chunks according to the configured size bounds.
#[must_use]
pub fn optimize(chunks: Vec<Chunk>, sizes: ChunkSizes) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let Some(current) = merged.last_mut() else {
            merged.push(chunk);
            continue;
        };
        if should_merge(current, &chunk, sizes) {
            let section = merge_sections(&current.section, &chunk.section);
            current.content.push_str(&chunk.content);
            for tag in chunk.types {
                if !current.types.contains(&tag) {
                    current.types.push(tag);
                }
            }
            current.section = section;
        } else {
            merged.push(chunk);
        }
    }

    merged
}

fn should_merge(current: &Chunk, next: &Chunk, sizes: ChunkSizes) -> bool {
    let current_len = current.content.chars().count();
    let next_len = next.content.chars().count();
    let combined = current_len + next_len;

    if combined > sizes.max_size {
        return false;
    }
    // A chunk that has grown to the preferred size never crosses into a new
    // top-level section.
    if current_len >= sizes.preferred_size && opens_top_section(current, next) {
        return false;
    }
    if combined <= sizes.preferred_size {
        return true;
    }
    // Beyond the preferred size, only absorb neighbors that are too small to
    // stand alone.
    current_len < sizes.min_size || next_len < sizes.min_size
}

/// Whether `next` begins a different H1/H2 section than `current` is in.
fn opens_top_section(current: &Chunk, next: &Chunk) -> bool {
    if next.section.level == 0 || next.section.level > 2 {
        return false;
    }
    let depth = next.section.level as usize;
    let next_prefix = &next.section.path[..depth.min(next.section.path.len())];
    let current_prefix = current
        .section
        .path
        .get(..depth)
        .unwrap_or(&current.section.path);
    next_prefix != current_prefix
}

fn merge_sections(a: &Section, b: &Section) -> Section {
    let level = a.level.min(b.level);
    let path = if a.path == b.path {
        a.path.clone()
    } else if is_prefix(&a.path, &b.path) {
        b.path.clone()
    } else if is_prefix(&b.path, &a.path) {
        a.path.clone()
    } else {
        common_prefix(&a.path, &b.path)
    };
    Section { level, path }
}

fn is_prefix(shorter: &[String], longer: &[String]) -> bool {
    shorter.len() <= longer.len() && longer[..shorter.len()] == *shorter
}

fn common_prefix(a: &[String], b: &[String]) -> Vec<String> {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.clone())
        .collect()
}
