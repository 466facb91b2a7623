//! Question canonicalization.
//!
//! "show me the latest blocks" and "give me the most recent blocks" must
//! land on the same cache key. Canonicalization lowercases, collapses
//! every synonym-group variant onto its canonical name, strips filler
//! words, and squeezes whitespace.
//!
//! Guarantee: deterministic and idempotent. Both the cache-write and
//! cache-read paths derive keys through this function, and either side may
//! canonicalize text that was already canonicalized.

use regex::Regex;

use crate::patterns::{FILLER_WORDS, SEMANTIC_GROUPS};

/// Canonicalize a natural-language question into a cache fingerprint.
pub fn canonicalize_question(text: &str) -> String {
    let mut out = text.to_lowercase();

    for group in SEMANTIC_GROUPS {
        for variant in group.variants {
            let re = variant_regex(variant);
            if re.is_match(&out) {
                out = re.replace_all(&out, group.canonical).into_owned();
            }
        }
    }

    for word in FILLER_WORDS {
        let re = Regex::new(&format!(r"\b{}\b", regex::escape(word))).unwrap();
        if re.is_match(&out) {
            out = re.replace_all(&out, " ").into_owned();
        }
    }

    squeeze_whitespace(&out)
}

/// Whole-word, case-insensitive matcher for one variant phrase.
///
/// Multi-word variants pluralize only the final word; single-word variants
/// accept an optional trailing "s".
fn variant_regex(variant: &str) -> Regex {
    let words: Vec<&str> = variant.split_whitespace().collect();
    let pattern = match words.split_last() {
        Some((tail, head)) if !head.is_empty() => {
            let head = head
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join(r"\s+");
            format!(r"\b{head}\s+{}s?\b", regex::escape(tail))
        }
        _ => format!(r"\b{}s?\b", regex::escape(variant)),
    };
    Regex::new(&pattern).unwrap()
}

fn squeeze_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
