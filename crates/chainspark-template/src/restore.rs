//! Cached template → concrete SPARQL for the *current* question.
//!
//! Restoration must never fail: a tag that cannot be resolved is left in
//! the output text. The worst case is a query the endpoint rejects, which
//! the caller already handles; a panic here would take down the whole
//! answer path for a cache bookkeeping problem.
//!
//! Value resolution order for the cyclic categories is: current value list
//! (indexed `i mod len`) → cached literal → category default. The defaults
//! (`"1"` for numbers and percentages, `"0.01"` for fractional
//! percentages, `"10"` for limits, clamp handled by the execution engine)
//! are anti-zero-result heuristics the cached corpus depends on; do not
//! "correct" them.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::warn;

use crate::extract::CategoryValues;
use crate::normalize::split_prefixes;
use crate::token::{Category, PlaceholderToken};

/// Bound on nested `INJ` sub-template resolution. A malformed map in which
/// injected fragments reference each other must still terminate.
const MAX_INJECT_DEPTH: usize = 8;

/// Rebuild a concrete query from a cached template.
///
/// `placeholders` maps tag text to the literal it replaced at
/// normalization time; `values` carries the lists extracted from the
/// question currently being answered.
pub fn restore_template(
    template: &str,
    placeholders: &BTreeMap<String, String>,
    values: &CategoryValues,
) -> String {
    let (prefixes, body) = split_prefixes(template);
    let restored = restore_body(&body, placeholders, values, MAX_INJECT_DEPTH);
    format!("{prefixes}{restored}")
}

fn restore_body(
    body: &str,
    placeholders: &BTreeMap<String, String>,
    values: &CategoryValues,
    depth: usize,
) -> String {
    let mut out = body.to_string();

    // Year tags are handled in a second pass over the body: their
    // replacement rewrites a 4-digit run *inside* the cached literal
    // rather than swapping the whole literal.
    let mut year_tags: Vec<(&str, &str, u32)> = Vec::new();

    for (text, cached) in placeholders {
        if !out.contains(text.as_str()) {
            continue;
        }
        let Some(token) = PlaceholderToken::parse(text) else {
            warn!(tag = text.as_str(), "leaving unparseable placeholder tag in query");
            continue;
        };

        let replacement = match token.category {
            Category::Percentage => cyclic(&values.percentages, token.index, cached, "1"),
            Category::PercentageDecimal => {
                cyclic(&values.percentages_decimal, token.index, cached, "0.01")
            }
            Category::Number => cyclic(&values.numbers, token.index, cached, "1"),
            Category::Limit => cyclic(&values.limits, token.index, cached, "10"),
            Category::StringLiteral => restore_string(cached, &values.tokens, token.index),
            Category::Ordering => restore_ordering(cached, &values.orderings),
            Category::Year => {
                year_tags.push((text.as_str(), cached.as_str(), token.index));
                continue;
            }
            Category::Injected => {
                if depth == 0 {
                    warn!(tag = text.as_str(), "injected sub-template nesting too deep");
                    cached.clone()
                } else {
                    restore_body(cached, placeholders, values, depth - 1)
                }
            }
            Category::Currency
            | Category::Uri
            | Category::Month
            | Category::Day
            | Category::Period
            | Category::Duration
            | Category::Definition
            | Category::Quantifier => cached.clone(),
        };

        out = out.replace(text.as_str(), &replacement);
    }

    for (text, cached, index) in year_tags {
        let replacement = restore_year(cached, &values.years, index);
        out = out.replace(text, &replacement);
    }

    out
}

fn cyclic(list: &[String], index: u32, cached: &str, default: &str) -> String {
    if !list.is_empty() {
        return list[index as usize % list.len()].clone();
    }
    if !cached.is_empty() {
        return cached.to_string();
    }
    default.to_string()
}

/// Current string value, cached quoting style.
///
/// SPARQL string literals are quote-sensitive, so the quote character
/// comes from the cached literal even when the body comes from the current
/// question. With no current tokens, the replacement is a double-quoted
/// empty string.
fn restore_string(cached: &str, tokens: &[String], index: u32) -> String {
    if tokens.is_empty() {
        return "\"\"".to_string();
    }
    let quote = cached
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .unwrap_or('"');
    let body = &tokens[index as usize % tokens.len()];
    format!("{quote}{body}{quote}")
}

/// Rewrite the first 4-digit run inside the cached literal.
///
/// Known risk, preserved on purpose: a literal containing more than one
/// 4-digit run (a full ISO timestamp, say) gets its *first* run rewritten,
/// whichever that is. The cached corpus was built against this behavior.
fn restore_year(cached: &str, years: &[String], index: u32) -> String {
    if years.is_empty() {
        return cached.to_string();
    }
    let year = &years[index as usize % years.len()];
    let re = Regex::new(r"\d{4}").unwrap();
    re.replacen(cached, 1, year.as_str()).into_owned()
}

/// Swap the direction inside the cached ordering literal (`DESC(?h)`)
/// for the first current ordering's direction (`"field:ASC"` → `ASC`).
fn restore_ordering(cached: &str, orderings: &[String]) -> String {
    let Some(first) = orderings.first() else {
        return cached.to_string();
    };
    let direction = first
        .rsplit_once(':')
        .map(|(_, d)| d)
        .unwrap_or(first.as_str())
        .to_ascii_uppercase();
    if direction != "ASC" && direction != "DESC" {
        warn!(ordering = first.as_str(), "ignoring malformed ordering value");
        return cached.to_string();
    }
    let re = Regex::new(r"(?i)\b(?:ASC|DESC)\b").unwrap();
    re.replacen(cached, 1, direction.as_str()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pass_through_currency_ignores_current_values() {
        let template = "SELECT ?x WHERE { ?x asset:ticker <CUR_0> }";
        let placeholders = map(&[("<CUR_0>", "cardano:ADA")]);
        let mut values = CategoryValues::default();
        values.numbers = strings(&["42"]);
        values.tokens = strings(&["BTC"]);

        let restored = restore_template(template, &placeholders, &values);
        assert_eq!(restored, "SELECT ?x WHERE { ?x asset:ticker cardano:ADA }");
    }

    #[test]
    fn cyclic_indexing_wraps_around() {
        let template = "VALUES ?n { <NUM_0> <NUM_1> <NUM_2> }";
        let placeholders = map(&[("<NUM_0>", "1"), ("<NUM_1>", "2"), ("<NUM_2>", "3")]);
        let values = CategoryValues {
            numbers: strings(&["5", "9"]),
            ..Default::default()
        };

        let restored = restore_template(template, &placeholders, &values);
        assert_eq!(restored, "VALUES ?n { 5 9 5 }");
    }

    #[test]
    fn limit_falls_back_to_cached_then_default() {
        let template = "SELECT ?b WHERE { ?b a blk:Block } LIMIT <LIM_0>";

        let cached = map(&[("<LIM_0>", "25")]);
        let restored = restore_template(template, &cached, &CategoryValues::default());
        assert!(restored.ends_with("LIMIT 25"));

        let absent = map(&[("<LIM_0>", "")]);
        let restored = restore_template(template, &absent, &CategoryValues::default());
        assert!(restored.ends_with("LIMIT 10"));
    }

    #[test]
    fn string_restoration_preserves_cached_quote_style() {
        let template = "FILTER(?name = <STR_0>)";
        let placeholders = map(&[("<STR_0>", "'Binance Pool'")]);
        let values = CategoryValues {
            tokens: strings(&["Etoro Pool"]),
            ..Default::default()
        };

        let restored = restore_template(template, &placeholders, &values);
        assert_eq!(restored, "FILTER(?name = 'Etoro Pool')");
    }

    #[test]
    fn string_restoration_defaults_to_empty_double_quoted() {
        let template = "FILTER(?name = <STR_0>)";
        let placeholders = map(&[("<STR_0>", "'Binance Pool'")]);

        let restored = restore_template(template, &placeholders, &CategoryValues::default());
        assert_eq!(restored, "FILTER(?name = \"\")");
    }

    #[test]
    fn year_rewrites_inside_the_cached_literal() {
        let template = "FILTER(?t >= <YEAR_0>^^xsd:dateTime)";
        let placeholders = map(&[("<YEAR_0>", "\"2022-01-01T00:00:00Z\"")]);
        let values = CategoryValues {
            years: strings(&["2024"]),
            ..Default::default()
        };

        let restored = restore_template(template, &placeholders, &values);
        assert_eq!(restored, "FILTER(?t >= \"2024-01-01T00:00:00Z\"^^xsd:dateTime)");
    }

    #[test]
    fn year_without_current_values_reuses_cached_literal() {
        let template = "FILTER(?t >= <YEAR_0>)";
        let placeholders = map(&[("<YEAR_0>", "\"2022-06-01\"")]);

        let restored = restore_template(template, &placeholders, &CategoryValues::default());
        assert_eq!(restored, "FILTER(?t >= \"2022-06-01\")");
    }

    #[test]
    fn ordering_direction_is_swapped_case_insensitively() {
        let template = "ORDER BY <ORDER_0>";
        let placeholders = map(&[("<ORDER_0>", "desc(?height)")]);
        let values = CategoryValues {
            orderings: strings(&["height:ASC"]),
            ..Default::default()
        };

        let restored = restore_template(template, &placeholders, &values);
        assert_eq!(restored, "ORDER BY ASC(?height)");
    }

    #[test]
    fn ordering_without_current_value_passes_through() {
        let template = "ORDER BY <ORDER_0>";
        let placeholders = map(&[("<ORDER_0>", "DESC(?height)")]);

        let restored = restore_template(template, &placeholders, &CategoryValues::default());
        assert_eq!(restored, "ORDER BY DESC(?height)");
    }

    #[test]
    fn injected_subtemplate_resolves_recursively() {
        let template = "SELECT ?b WHERE { <INJ_0> } LIMIT <LIM_0>";
        let placeholders = map(&[
            ("<INJ_0>", "?b blk:height ?h . FILTER(?h > <NUM_0>)"),
            ("<NUM_0>", "100"),
            ("<LIM_0>", "10"),
        ]);
        let values = CategoryValues {
            numbers: strings(&["7000"]),
            limits: strings(&["3"]),
            ..Default::default()
        };

        let restored = restore_template(template, &placeholders, &values);
        assert_eq!(
            restored,
            "SELECT ?b WHERE { ?b blk:height ?h . FILTER(?h > 7000) } LIMIT 3"
        );
    }

    #[test]
    fn self_referencing_injection_terminates() {
        let template = "SELECT ?b WHERE { <INJ_0> }";
        let placeholders = map(&[("<INJ_0>", "nested <INJ_0> nested")]);

        let restored = restore_template(template, &placeholders, &CategoryValues::default());
        // Bounded recursion: the output still contains the unresolved tag
        // at the innermost level, but we got an answer instead of a hang.
        assert!(restored.contains("nested"));
    }

    #[test]
    fn unresolvable_tags_are_left_in_place() {
        let template = "SELECT ?x WHERE { ?x ?p <WAT_0> }";
        let placeholders = map(&[("<WAT_0>", "whatever")]);

        let restored = restore_template(template, &placeholders, &CategoryValues::default());
        assert_eq!(restored, template);
    }

    #[test]
    fn prefix_block_is_preserved_verbatim() {
        let template = "PREFIX blk: <http://chainspark.io/block#>\n\
                        PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>\n\
                        SELECT ?b WHERE { ?b a blk:Block } LIMIT <LIM_0>";
        let placeholders = map(&[("<LIM_0>", "5")]);

        let restored = restore_template(template, &placeholders, &CategoryValues::default());
        let expected_head = "PREFIX blk: <http://chainspark.io/block#>\n\
                             PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>\n";
        assert!(restored.starts_with(expected_head));
        assert!(restored.ends_with("LIMIT 5"));
    }
}
