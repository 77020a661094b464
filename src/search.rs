//! Hybrid search: exact substring matching over the metadata table merged
//! with nearest-neighbor retrieval from the vector store.
//!
//! Result order is deterministic: full-text matches first, in snapshot
//! iteration order, then vector-only matches by ascending distance. A
//! path matched by both sides contributes once. Hits are always hydrated
//! from the metadata record; the vector store's projection is never used
//! for display, and vector hits for paths the snapshot no longer knows
//! are dropped.

use std::collections::HashSet;

use crate::gallery::{MetadataSnapshot, SearchHit};
use crate::semantic::{Neighbor, VectorStore};

/// How many candidates to ask the vector store for per query.
pub const VECTOR_SEARCH_LIMIT: usize = 500;

/// Run a hybrid search over one folder.
///
/// An empty query lists every image in the snapshot.
pub fn search(query: &str, snapshot: &MetadataSnapshot, vectors: &VectorStore) -> Vec<SearchHit> {
    if query.trim().is_empty() {
        return snapshot
            .iter()
            .map(|(path, record)| SearchHit::hydrate(path, record))
            .collect();
    }

    let full_text = full_text_matches(snapshot, query);
    let semantic = vectors.search(query, VECTOR_SEARCH_LIMIT);

    merge_hits(snapshot, full_text, &semantic)
}

/// Paths whose description, extracted text, or any tag contains `query`
/// as a case-insensitive substring, in snapshot iteration order.
pub fn full_text_matches(snapshot: &MetadataSnapshot, query: &str) -> Vec<String> {
    let needle = query.to_lowercase();
    snapshot
        .iter()
        .filter(|(_, record)| record.matches(&needle))
        .map(|(path, _)| path.clone())
        .collect()
}

/// Union full-text and vector results into hydrated hits, de-duplicated
/// by path. `semantic` is expected in ascending-distance order.
pub fn merge_hits(
    snapshot: &MetadataSnapshot,
    full_text: Vec<String>,
    semantic: &[Neighbor],
) -> Vec<SearchHit> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut hits = Vec::new();

    for path in &full_text {
        if let Some(record) = snapshot.get(path) {
            if seen.insert(path.as_str()) {
                hits.push(SearchHit::hydrate(path, record));
            }
        }
    }

    for neighbor in semantic {
        // entries the snapshot no longer knows are stale index leftovers
        if let Some(record) = snapshot.get(&neighbor.path) {
            if seen.insert(neighbor.path.as_str()) {
                hits.push(SearchHit::hydrate(&neighbor.path, record));
            }
        }
    }

    hits
}
