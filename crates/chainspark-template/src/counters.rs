//! Per-category placeholder index allocation.
//!
//! The normalizer needs the next free index for each category so that
//! re-normalizing text that already carries placeholder tags is idempotent
//! and never reuses an index. A counters value is built fresh per
//! normalization pass; nothing here is shared or persisted.

use std::collections::HashMap;

use tracing::warn;

use crate::token::{Category, PlaceholderToken};

#[derive(Debug, Default, Clone)]
pub struct PlaceholderCounters {
    next: HashMap<Category, u32>,
}

impl PlaceholderCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an already-present tag.
    ///
    /// For `<CAT_i>` this raises the category's next index to at least
    /// `i + 1`. Malformed tags are logged and ignored; a bad tag in a
    /// template must never poison a normalization pass.
    pub fn update_from_token(&mut self, text: &str) {
        match PlaceholderToken::parse(text) {
            Some(token) => self.note(&token),
            None => warn!(tag = text, "ignoring malformed placeholder tag"),
        }
    }

    pub fn note(&mut self, token: &PlaceholderToken) {
        let entry = self.next.entry(token.category).or_insert(0);
        *entry = (*entry).max(token.index + 1);
    }

    pub fn next_index(&self, category: Category) -> u32 {
        self.next.get(&category).copied().unwrap_or(0)
    }

    /// Allocate the next index for `category`, bumping the counter.
    pub fn claim(&mut self, category: Category) -> u32 {
        let index = self.next_index(category);
        self.next.insert(category, index + 1);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_start_at_zero() {
        let counters = PlaceholderCounters::new();
        assert_eq!(counters.next_index(Category::Number), 0);
    }

    #[test]
    fn update_takes_the_max() {
        let mut counters = PlaceholderCounters::new();
        counters.update_from_token("<NUM_3>");
        counters.update_from_token("<NUM_1>");
        assert_eq!(counters.next_index(Category::Number), 4);
        assert_eq!(counters.next_index(Category::Limit), 0);
    }

    #[test]
    fn malformed_tags_are_ignored() {
        let mut counters = PlaceholderCounters::new();
        counters.update_from_token("<NUM_abc>");
        counters.update_from_token("<NOPE_1>");
        counters.update_from_token("");
        assert_eq!(counters.next_index(Category::Number), 0);
    }

    #[test]
    fn claim_is_sequential() {
        let mut counters = PlaceholderCounters::new();
        assert_eq!(counters.claim(Category::Limit), 0);
        assert_eq!(counters.claim(Category::Limit), 1);
        counters.update_from_token("<LIM_5>");
        assert_eq!(counters.claim(Category::Limit), 6);
    }
}
