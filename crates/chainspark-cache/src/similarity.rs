//! Token-set similarity over canonicalized questions.
//!
//! Used for the semantic cache-lookup fallback and for few-shot example
//! selection. Word *sets*, not sequences: "latest blocks 5" and
//! "5 latest blocks" score 1.0. Two empty sets score 0.0 — an empty
//! question must never match everything.

use std::collections::HashSet;

use crate::cache::CacheEntry;

/// Jaccard similarity of the word sets of two strings.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let wa: HashSet<&str> = a.split_whitespace().collect();
    let wb: HashSet<&str> = b.split_whitespace().collect();
    let union = wa.union(&wb).count();
    if union == 0 {
        return 0.0;
    }
    wa.intersection(&wb).count() as f64 / union as f64
}

/// A cached query ranked against an incoming question.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarQuery {
    pub original_query: String,
    pub normalized_query: String,
    pub sparql_query: String,
    pub similarity_score: f64,
    pub is_sequential: bool,
    pub precached: bool,
}

/// Score entries against a canonicalized question, keep those at or above
/// `min_similarity`, sort descending, truncate to `top_n`.
///
/// Linear in the number of entries by design: the cache is bounded and
/// periodically rebuilt, and an index over normalized tokens is an
/// extension point, not part of this contract.
pub fn rank_by_similarity(
    canonical_question: &str,
    entries: impl IntoIterator<Item = CacheEntry>,
    top_n: usize,
    min_similarity: f64,
) -> Vec<SimilarQuery> {
    let mut ranked: Vec<SimilarQuery> = entries
        .into_iter()
        .filter_map(|entry| {
            let score = jaccard_similarity(canonical_question, &entry.normalized_query);
            if score < min_similarity {
                return None;
            }
            Some(SimilarQuery {
                original_query: entry.original_query,
                normalized_query: entry.normalized_query,
                sparql_query: entry.sparql_query,
                similarity_score: score,
                is_sequential: entry.is_sequential,
                precached: entry.precached,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(top_n);
    ranked
}
