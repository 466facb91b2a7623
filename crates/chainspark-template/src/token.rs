//! Typed placeholder tags.
//!
//! A placeholder is serialized as `<CATEGORY_INDEX>` (e.g. `<PCT_3>`,
//! `<PCT_DECIMAL_1>`). Inside a SPARQL body the tag reads as a relative
//! IRI, so templates stay syntactically plausible for tooling; real IRIs
//! extracted as `URI` placeholders are required to carry a scheme, so the
//! two can never collide.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder category.
///
/// Parsed once at the boundary; everything downstream matches on this enum
/// exhaustively. Category names that share a textual prefix (`PCT` vs
/// `PCT_DECIMAL`) are unambiguous here because parsing splits on the *last*
/// underscore of the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Whole-number percentage (`25` as in "25%").
    Percentage,
    /// Fractional percentage (`0.25`).
    PercentageDecimal,
    /// Standalone number.
    Number,
    /// Quoted string literal body.
    StringLiteral,
    /// `LIMIT` clause value.
    Limit,
    /// Currency/asset ticker. Pass-through: restored from the cached literal.
    Currency,
    /// Full IRI. Pass-through.
    Uri,
    /// 4-digit year inside a date/dateTime literal.
    Year,
    Month,
    Day,
    /// Named time period ("epoch", "quarter"). Pass-through.
    Period,
    /// `ASC`/`DESC` ordering direction.
    Ordering,
    /// Nested sub-template: the cached value is itself a template fragment
    /// whose own tags are resolved recursively.
    Injected,
    Duration,
    Definition,
    Quantifier,
}

impl Category {
    pub const ALL: &'static [Category] = &[
        Category::Percentage,
        Category::PercentageDecimal,
        Category::Number,
        Category::StringLiteral,
        Category::Limit,
        Category::Currency,
        Category::Uri,
        Category::Year,
        Category::Month,
        Category::Day,
        Category::Period,
        Category::Ordering,
        Category::Injected,
        Category::Duration,
        Category::Definition,
        Category::Quantifier,
    ];

    /// The tag name used in serialized placeholders.
    pub fn tag(&self) -> &'static str {
        match self {
            Category::Percentage => "PCT",
            Category::PercentageDecimal => "PCT_DECIMAL",
            Category::Number => "NUM",
            Category::StringLiteral => "STR",
            Category::Limit => "LIM",
            Category::Currency => "CUR",
            Category::Uri => "URI",
            Category::Year => "YEAR",
            Category::Month => "MONTH",
            Category::Day => "DAY",
            Category::Period => "PERIOD",
            Category::Ordering => "ORDER",
            Category::Injected => "INJ",
            Category::Duration => "DUR",
            Category::Definition => "DEF",
            Category::Quantifier => "QUANT",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.tag() == tag)
    }

    /// Categories whose replacement cycles through a current-value list.
    pub fn is_cyclic(&self) -> bool {
        matches!(
            self,
            Category::Percentage
                | Category::PercentageDecimal
                | Category::Number
                | Category::Limit
        )
    }

    /// Categories restored from the cached literal verbatim.
    pub fn is_pass_through(&self) -> bool {
        matches!(
            self,
            Category::Currency
                | Category::Uri
                | Category::Month
                | Category::Day
                | Category::Period
                | Category::Duration
                | Category::Definition
                | Category::Quantifier
        )
    }
}

/// A parsed `<CATEGORY_INDEX>` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceholderToken {
    pub category: Category,
    pub index: u32,
}

impl PlaceholderToken {
    pub fn new(category: Category, index: u32) -> Self {
        Self { category, index }
    }

    /// Parse a tag, with or without the angle-bracket delimiters.
    ///
    /// Splitting on the *last* underscore makes multi-word category names
    /// (`PCT_DECIMAL`) unambiguous without any prefix-ordering rules.
    pub fn parse(text: &str) -> Option<Self> {
        let inner = text
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .unwrap_or(text);
        let (tag, index) = inner.rsplit_once('_')?;
        let index: u32 = index.parse().ok()?;
        let category = Category::from_tag(tag)?;
        Some(Self { category, index })
    }

    pub fn render(&self) -> String {
        format!("<{}_{}>", self.category.tag(), self.index)
    }
}

impl fmt::Display for PlaceholderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}_{}>", self.category.tag(), self.index)
    }
}
