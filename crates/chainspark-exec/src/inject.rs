//! Locating `INJECT(...)` sites in a query step.
//!
//! The inner expression can itself contain parentheses (`INJECT(max(1,
//! offset - 10))`), so sites are found by explicit depth counting, not by
//! a regex. An unbalanced site is reported as such and left untouched by
//! the engine.

use tracing::warn;

/// Markers checked longest-first so `INJECT_FROM_PREVIOUS` is never
/// misread as `INJECT` with a stray suffix.
const MARKERS: &[&str] = &["INJECT_FROM_PREVIOUS", "INJECT"];

/// One `INJECT` occurrence: the byte span of the whole `MARKER(...)` text
/// and the inner expression (with any `evaluate(...)` wrapper stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectSite {
    pub start: usize,
    pub end: usize,
    pub expression: String,
}

/// Find all injection sites, left to right, non-overlapping.
pub fn find_inject_sites(query: &str) -> Vec<InjectSite> {
    let mut sites = Vec::new();
    let bytes = query.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        let Some((marker, marker_len)) = marker_at(query, i) else {
            i += 1;
            continue;
        };

        let after_marker = i + marker_len;
        let Some(open) = next_non_space(query, after_marker).filter(|&p| bytes[p] == b'(') else {
            // A bare marker word ("INJECTED", prose, etc). Skip past it.
            i = after_marker;
            continue;
        };

        match matching_paren(query, open) {
            Some(close) => {
                let inner = &query[open + 1..close];
                sites.push(InjectSite {
                    start: i,
                    end: close + 1,
                    expression: strip_evaluate_wrapper(inner).trim().to_string(),
                });
                i = close + 1;
            }
            None => {
                warn!(marker, at = i, "unbalanced INJECT site, leaving as-is");
                i = after_marker;
            }
        }
    }

    sites
}

fn marker_at(query: &str, at: usize) -> Option<(&'static str, usize)> {
    for marker in MARKERS {
        if query[at..].starts_with(marker) {
            // Reject matches inside a longer identifier (`REINJECT`).
            let prev_is_word = at > 0
                && query[..at]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            if prev_is_word {
                return None;
            }
            let after = at + marker.len();
            let next_is_word = query[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            if next_is_word {
                // `INJECT_FROM_PREVIOUS` already matched first; anything
                // else word-like after a marker is a different identifier.
                return None;
            }
            return Some((marker, marker.len()));
        }
    }
    None
}

fn next_non_space(query: &str, from: usize) -> Option<usize> {
    query[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(off, _)| from + off)
}

/// Index of the `)` matching the `(` at `open`, by depth counting.
fn matching_paren(query: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (off, c) in query[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + off);
                }
            }
            _ => {}
        }
    }
    None
}

/// `evaluate( expr )` is readability sugar around the expression itself.
fn strip_evaluate_wrapper(inner: &str) -> &str {
    let trimmed = inner.trim();
    let Some(rest) = trimmed.strip_prefix("evaluate") else {
        return trimmed;
    };
    let rest = rest.trim_start();
    if !rest.starts_with('(') {
        return trimmed;
    }
    match matching_paren(rest, 0) {
        // Only unwrap when the parens span the whole remainder; anything
        // else is an expression that merely begins with a call.
        Some(close) if close == rest.len() - 1 => &rest[1..close],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_simple_site() {
        let q = "SELECT ?b WHERE { ... } LIMIT INJECT(x + 1)";
        let sites = find_inject_sites(q);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].expression, "x + 1");
        assert_eq!(&q[sites[0].start..sites[0].end], "INJECT(x + 1)");
    }

    #[test]
    fn from_previous_marker_is_not_misread() {
        let q = "LIMIT INJECT_FROM_PREVIOUS(total - 2)";
        let sites = find_inject_sites(q);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].expression, "total - 2");
        assert!(q[sites[0].start..].starts_with("INJECT_FROM_PREVIOUS"));
    }

    #[test]
    fn nested_parens_are_balanced() {
        let q = "OFFSET INJECT(max(0, (total - 10) / 2))";
        let sites = find_inject_sites(q);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].expression, "max(0, (total - 10) / 2)");
    }

    #[test]
    fn evaluate_wrapper_is_stripped() {
        let q = "LIMIT INJECT(evaluate(x - 10))";
        let sites = find_inject_sites(q);
        assert_eq!(sites[0].expression, "x - 10");
    }

    #[test]
    fn evaluate_prefix_of_a_larger_expression_is_kept() {
        let q = "LIMIT INJECT(evaluate(x) + 1)";
        let sites = find_inject_sites(q);
        // `evaluate(x) + 1` is not a wrapper; left for the evaluator,
        // which rejects `evaluate` as a function name.
        assert_eq!(sites[0].expression, "evaluate(x) + 1");
    }

    #[test]
    fn multiple_sites_in_order() {
        let q = "LIMIT INJECT(a) OFFSET INJECT(b)";
        let sites = find_inject_sites(q);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].expression, "a");
        assert_eq!(sites[1].expression, "b");
        assert!(sites[0].end <= sites[1].start);
    }

    #[test]
    fn unbalanced_site_is_skipped() {
        let q = "LIMIT INJECT(max(1, 2)";
        assert!(find_inject_sites(q).is_empty());
    }

    #[test]
    fn similar_identifiers_are_not_sites() {
        let q = "SELECT ?x WHERE { ?x a :REINJECT(ed) }";
        assert!(find_inject_sites(q).is_empty());
        assert!(find_inject_sites("INJECTED(q)").is_empty());
    }

    #[test]
    fn no_sites_in_plain_query() {
        assert!(find_inject_sites("SELECT ?b WHERE { ?b a blk:Block }").is_empty());
    }
}
