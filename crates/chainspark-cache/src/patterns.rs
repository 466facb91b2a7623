//! Term-equivalence tables used by question canonicalization.
//!
//! Pure data, process-wide constants. Each group collapses every variant
//! phrase onto one canonical name; variants are matched whole-word and
//! case-insensitively, multi-word variants pluralize only the final word.
//!
//! Collapsing comparison/possession terms occasionally conflates
//! distinct-but-related questions. That trade is intentional: exact-string
//! caching on natural language has a near-zero hit rate, and a slightly
//! lossy fingerprint buys materially higher reuse.

/// One equivalence class: every variant rewrites to `canonical`.
#[derive(Debug, Clone, Copy)]
pub struct SynonymGroup {
    pub canonical: &'static str,
    pub variants: &'static [&'static str],
}

/// Applied in order; within a group, longer variants are listed first so a
/// phrase is consumed before any sub-phrase of it can match.
pub const SEMANTIC_GROUPS: &[SynonymGroup] = &[
    // Aggregation verbs
    SynonymGroup {
        canonical: "count",
        variants: &["total number of", "number of", "how many"],
    },
    SynonymGroup {
        canonical: "sum",
        variants: &["total amount of", "total value of", "sum of"],
    },
    SynonymGroup {
        canonical: "average",
        variants: &["mean", "avg"],
    },
    // Aggregation over time
    SynonymGroup {
        canonical: "over time",
        variants: &["through time", "across time", "historically"],
    },
    // Recency / rank
    SynonymGroup {
        canonical: "latest",
        variants: &["most recent", "newest", "last"],
    },
    SynonymGroup {
        canonical: "oldest",
        variants: &["earliest"],
    },
    SynonymGroup {
        canonical: "top",
        variants: &["highest ranked", "best performing", "leading", "best"],
    },
    SynonymGroup {
        canonical: "bottom",
        variants: &["lowest ranked", "worst performing", "worst"],
    },
    // Comparison words
    SynonymGroup {
        canonical: "more",
        variants: &["greater", "higher", "larger", "bigger", "exceeding"],
    },
    SynonymGroup {
        canonical: "less",
        variants: &["fewer", "lower", "smaller"],
    },
    // Possession
    SynonymGroup {
        canonical: "with",
        variants: &["that have", "which have", "having", "holding"],
    },
    // Temporal bucketing
    SynonymGroup {
        canonical: "day",
        variants: &["per day", "daily"],
    },
    SynonymGroup {
        canonical: "month",
        variants: &["per month", "monthly"],
    },
    SynonymGroup {
        canonical: "year",
        variants: &["per year", "yearly", "annually"],
    },
    SynonymGroup {
        canonical: "epoch",
        variants: &["per epoch"],
    },
    // Chart types
    SynonymGroup {
        canonical: "bar chart",
        variants: &["column chart", "bar graph", "histogram"],
    },
    SynonymGroup {
        canonical: "line chart",
        variants: &["time series chart", "line graph", "trend chart"],
    },
    SynonymGroup {
        canonical: "pie chart",
        variants: &["donut chart", "pie graph"],
    },
    SynonymGroup {
        canonical: "table",
        variants: &["tabular view", "grid view"],
    },
];

/// Semantic sugar: stripped entirely (word-boundary removal) after the
/// synonym passes. None of these may appear in a canonical name above.
pub const FILLER_WORDS: &[&str] = &[
    "please", "kindly", "show", "give", "display", "tell", "list", "me", "us", "i", "we", "you",
    "can", "could", "would", "like", "want", "need", "to", "see", "get", "find", "fetch", "what",
    "which", "is", "are", "was", "were", "do", "does", "did", "the", "a", "an", "of", "all",
    "some", "any", "there", "their", "it", "its", "for", "in", "on", "at", "as", "and", "or",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_are_not_filler() {
        for group in SEMANTIC_GROUPS {
            for word in group.canonical.split_whitespace() {
                assert!(
                    !FILLER_WORDS.contains(&word),
                    "canonical '{}' contains filler word '{}'",
                    group.canonical,
                    word
                );
            }
        }
    }

    #[test]
    fn canonical_names_are_not_variants_of_any_group() {
        for group in SEMANTIC_GROUPS {
            for other in SEMANTIC_GROUPS {
                for variant in other.variants {
                    assert_ne!(
                        group.canonical, *variant,
                        "canonical '{}' is also a variant of '{}'",
                        group.canonical, other.canonical
                    );
                }
            }
        }
    }

    #[test]
    fn variants_are_unique_across_groups() {
        let mut seen = std::collections::HashSet::new();
        for group in SEMANTIC_GROUPS {
            for variant in group.variants {
                assert!(seen.insert(*variant), "duplicate variant '{variant}'");
            }
        }
    }
}
