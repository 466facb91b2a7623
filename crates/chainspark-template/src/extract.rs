//! Value extraction from the question currently being answered.
//!
//! On a cache hit the cached template is restored against values from the
//! *current* question, not the ones it was cached with. These lists are
//! ordered by first appearance; restoration indexes into them cyclically.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Per-category value lists, ordered by appearance.
///
/// Orderings are encoded as `"field:ASC"` / `"field:DESC"`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryValues {
    pub numbers: Vec<String>,
    pub percentages: Vec<String>,
    pub percentages_decimal: Vec<String>,
    pub tokens: Vec<String>,
    pub limits: Vec<String>,
    pub years: Vec<String>,
    pub orderings: Vec<String>,
}

impl CategoryValues {
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
            && self.percentages.is_empty()
            && self.percentages_decimal.is_empty()
            && self.tokens.is_empty()
            && self.limits.is_empty()
            && self.years.is_empty()
            && self.orderings.is_empty()
    }

    /// Extract values from a natural-language question.
    ///
    /// "show the top 5 pools with more than 25% saturation since 2023"
    /// yields limits `["5"]`, numbers `["5"]`, percentages `["25"]`,
    /// percentages_decimal `["0.25"]`, years `["2023"]`.
    pub fn from_question(text: &str) -> Self {
        let mut values = CategoryValues::default();

        let limit_re = Regex::new(r"(?i)\b(?:top|first|last|latest|recent)\s+(\d+)\b").unwrap();
        for caps in limit_re.captures_iter(text) {
            values.limits.push(caps[1].to_string());
        }

        // Percent mentions also yield their fractional form, so a question
        // phrased with "25%" can restore a template cached with `0.25`.
        let pct_re = Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(?:%|percent)").unwrap();
        let mut pct_spans: Vec<(usize, usize)> = Vec::new();
        for caps in pct_re.captures_iter(text) {
            let m = caps.get(1).expect("group 1 always present");
            pct_spans.push((m.start(), m.end()));
            values.percentages.push(m.as_str().to_string());
            if let Ok(v) = m.as_str().parse::<f64>() {
                values.percentages_decimal.push(format!("{}", v / 100.0));
            }
        }

        let frac_re = Regex::new(r"\b0\.\d+\b").unwrap();
        for m in frac_re.find_iter(text) {
            if pct_spans.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            values.percentages_decimal.push(m.as_str().to_string());
        }

        let year_re = Regex::new(r"\b(?:19|20)\d{2}\b").unwrap();
        let mut year_spans: Vec<(usize, usize)> = Vec::new();
        for m in year_re.find_iter(text) {
            year_spans.push((m.start(), m.end()));
            values.years.push(m.as_str().to_string());
        }

        let num_re = Regex::new(r"\b\d+\b").unwrap();
        for m in num_re.find_iter(text) {
            let overlaps = |spans: &[(usize, usize)]| {
                spans.iter().any(|&(s, e)| m.start() < e && s < m.end())
            };
            if overlaps(&pct_spans) || overlaps(&year_spans) {
                continue;
            }
            if text[m.end()..].starts_with('.') || text[..m.start()].ends_with('.') {
                continue;
            }
            values.numbers.push(m.as_str().to_string());
        }

        let asc_re = Regex::new(r"(?i)\b(?:ascending|increasing|asc)\b").unwrap();
        let desc_re = Regex::new(r"(?i)\b(?:descending|decreasing|desc)\b").unwrap();
        if asc_re.is_match(text) {
            values.orderings.push("value:ASC".to_string());
        }
        if desc_re.is_match(text) {
            values.orderings.push("value:DESC".to_string());
        }

        values
    }
}
