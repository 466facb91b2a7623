//! Concrete SPARQL → reusable template.
//!
//! Literal values in the query body are replaced, in deterministic pass
//! order, by typed placeholder tags. The original literal is recorded per
//! tag (the placeholder map) and also appended to the per-category value
//! lists, so `restore_template(normalize_query(q))` with the same values
//! reproduces `q`.
//!
//! Leading `PREFIX` declarations are split off first and reattached
//! verbatim; prefixes are never placeholder-bearing.

use std::collections::BTreeMap;

use regex::{Captures, Regex};

use crate::counters::PlaceholderCounters;
use crate::extract::CategoryValues;
use crate::token::{Category, PlaceholderToken};

/// Matches any serialized placeholder tag already present in the text.
const TAG_PATTERN: &str = r"<[A-Z][A-Z_]*_\d+>";

/// Asset tickers recognized as pass-through currency placeholders.
pub const CURRENCY_TICKERS: &[&str] = &[
    "ADA", "LOVELACE", "BTC", "ETH", "SOL", "DOT", "XRP", "USDT", "USDC",
];

/// A normalized query: template plus everything needed to restore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub template: String,
    /// tag text → the literal it replaced.
    pub placeholders: BTreeMap<String, String>,
    /// Per-category literals in appearance order.
    pub values: CategoryValues,
}

/// Split leading `PREFIX` declarations from the query body.
///
/// Anchored at the start, case-insensitive, line-oriented. Returns
/// `(prefix_block, body)`; concatenating the two reproduces the input.
pub fn split_prefixes(query: &str) -> (String, String) {
    let re = Regex::new(r"(?i)\A(?:[ \t]*prefix[ \t]+[^\n]*(?:\n|\z)|[ \t]*\n)+").unwrap();
    match re.find(query) {
        Some(m) => (
            query[..m.end()].to_string(),
            query[m.end()..].to_string(),
        ),
        None => (String::new(), query.to_string()),
    }
}

/// Normalize a concrete SPARQL query into a template.
pub fn normalize_query(sparql: &str) -> NormalizedQuery {
    let (prefixes, body) = split_prefixes(sparql);

    let mut counters = PlaceholderCounters::new();
    let tag_re = Regex::new(TAG_PATTERN).unwrap();
    for m in tag_re.find_iter(&body) {
        counters.update_from_token(m.as_str());
    }

    let mut pass = NormalizePass {
        body,
        counters,
        placeholders: BTreeMap::new(),
        values: CategoryValues::default(),
    };

    pass.strings_and_dates();
    pass.iris();
    pass.orderings();
    pass.limits();
    pass.currencies();
    pass.fractions();
    pass.bare_years();
    pass.numbers();

    NormalizedQuery {
        template: format!("{prefixes}{}", pass.body),
        placeholders: pass.placeholders,
        values: pass.values,
    }
}

struct NormalizePass {
    body: String,
    counters: PlaceholderCounters,
    placeholders: BTreeMap<String, String>,
    values: CategoryValues,
}

impl NormalizePass {
    fn claim(&mut self, category: Category, literal: &str) -> String {
        let token = PlaceholderToken::new(category, self.counters.claim(category));
        let text = token.render();
        self.placeholders.insert(text.clone(), literal.to_string());
        text
    }

    /// Replace matches of `re`, skipping any that overlap an existing tag
    /// (tags contain digits, so the numeric passes would otherwise chew on
    /// their own output). The callback returns `None` to leave a match.
    fn rewrite(&mut self, re: &Regex, mut f: impl FnMut(&mut Self, &Captures) -> Option<String>) {
        let tag_re = Regex::new(TAG_PATTERN).unwrap();
        let body = std::mem::take(&mut self.body);
        let protected: Vec<(usize, usize)> =
            tag_re.find_iter(&body).map(|m| (m.start(), m.end())).collect();

        let mut out = String::with_capacity(body.len());
        let mut last = 0usize;
        for caps in re.captures_iter(&body) {
            let m = caps.get(0).expect("group 0 always present");
            if m.start() < last {
                continue;
            }
            if protected.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            let Some(replacement) = f(self, &caps) else {
                continue;
            };
            out.push_str(&body[last..m.start()]);
            out.push_str(&replacement);
            last = m.end();
        }
        out.push_str(&body[last..]);
        self.body = out;
    }

    /// Quoted literals. Date-shaped bodies become `YEAR` placeholders (the
    /// cached literal keeps the full quoted text; restoration rewrites the
    /// 4-digit run inside it), everything else becomes `STR`.
    fn strings_and_dates(&mut self) {
        let re = Regex::new(r#""([^"\\]*)"|'([^'\\]*)'"#).unwrap();
        let date_re = Regex::new(r"^\d{4}-\d{2}").unwrap();
        self.rewrite(&re, |pass, caps| {
            let literal = caps.get(0).expect("group 0 always present").as_str();
            let inner = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if date_re.is_match(inner) {
                pass.values.years.push(inner[..4].to_string());
                Some(pass.claim(Category::Year, literal))
            } else {
                pass.values.tokens.push(inner.to_string());
                Some(pass.claim(Category::StringLiteral, literal))
            }
        });
    }

    /// Full IRIs are pass-through placeholders: they identify graph
    /// entities and are not expected to vary between equivalent questions.
    fn iris(&mut self) {
        let re = Regex::new(r"<[A-Za-z][A-Za-z0-9+.-]*:[^>\s]*>").unwrap();
        self.rewrite(&re, |pass, caps| {
            let literal = caps.get(0).expect("group 0 always present").as_str();
            Some(pass.claim(Category::Uri, literal))
        });
    }

    fn orderings(&mut self) {
        let re =
            Regex::new(r"(?i)\b(ORDER\s+BY\s+)((?:ASC|DESC)\s*\(\s*\?([A-Za-z_][A-Za-z0-9_]*)\s*\))")
                .unwrap();
        self.rewrite(&re, |pass, caps| {
            let keyword = caps.get(1).expect("group 1 always present").as_str();
            let literal = caps.get(2).expect("group 2 always present").as_str();
            let field = caps.get(3).expect("group 3 always present").as_str();
            let direction = if literal.to_ascii_uppercase().starts_with("ASC") {
                "ASC"
            } else {
                "DESC"
            };
            pass.values.orderings.push(format!("{field}:{direction}"));
            let token = pass.claim(Category::Ordering, literal);
            Some(format!("{keyword}{token}"))
        });
    }

    fn limits(&mut self) {
        let re = Regex::new(r"(?i)\b(LIMIT\s+)(\d+)").unwrap();
        self.rewrite(&re, |pass, caps| {
            let keyword = caps.get(1).expect("group 1 always present").as_str();
            let value = caps.get(2).expect("group 2 always present").as_str();
            pass.values.limits.push(value.to_string());
            let token = pass.claim(Category::Limit, value);
            Some(format!("{keyword}{token}"))
        });
    }

    /// Asset tickers, optionally carried on a prefixed name
    /// (`cardano:ADA`). Pass-through on restore.
    fn currencies(&mut self) {
        let re = Regex::new(&format!(
            r"\b(?:[a-z][a-z0-9]*:)?(?:{})\b",
            CURRENCY_TICKERS.join("|")
        ))
        .unwrap();
        self.rewrite(&re, |pass, caps| {
            let literal = caps.get(0).expect("group 0 always present").as_str();
            Some(pass.claim(Category::Currency, literal))
        });
    }

    fn fractions(&mut self) {
        let re = Regex::new(r"\b0\.\d+\b").unwrap();
        self.rewrite(&re, |pass, caps| {
            let literal = caps.get(0).expect("group 0 always present").as_str();
            pass.values.percentages_decimal.push(literal.to_string());
            Some(pass.claim(Category::PercentageDecimal, literal))
        });
    }

    fn bare_years(&mut self) {
        let re = Regex::new(r"\b(?:19|20)\d{2}\b").unwrap();
        self.rewrite(&re, |pass, caps| {
            let m = caps.get(0).expect("group 0 always present");
            let literal = m.as_str();
            pass.values.years.push(literal.to_string());
            Some(pass.claim(Category::Year, literal))
        });
    }

    fn numbers(&mut self) {
        let re = Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap();
        self.rewrite(&re, |pass, caps| {
            let m = caps.get(0).expect("group 0 always present");
            let literal = m.as_str();
            pass.values.numbers.push(literal.to_string());
            Some(pass.claim(Category::Number, literal))
        });
    }
}
