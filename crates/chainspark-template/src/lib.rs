//! Chainspark query templating.
//!
//! An LLM-generated SPARQL query is expensive; a *template* of one is
//! reusable. This crate turns a concrete query into a template by replacing
//! literal values with typed, indexed placeholder tags, and turns a cached
//! template back into a concrete query using values extracted from the
//! question currently being answered:
//!
//! ```text
//!   SELECT ?b WHERE { ... } LIMIT 5
//!        │ normalize_query                 ▲ restore_template
//!        ▼                                 │
//!   SELECT ?b WHERE { ... } LIMIT <LIM_0>  + { "<LIM_0>": "5" } + current values
//! ```
//!
//! Design rules (these are load-bearing for cache compatibility):
//!
//! - Placeholder tags are parsed **once** into `{ category, index }` and
//!   dispatched over the [`token::Category`] enum. No string-prefix sniffing.
//! - Per category, indices are contiguous from 0 in order of first
//!   appearance, so restoration can index value lists cyclically
//!   (`i mod len`) when the current question supplies a different count of
//!   same-category values than the cached query had.
//! - Restoration never fails. Unknown or unresolvable tags are left in the
//!   output; the damage surfaces (if at all) as a downstream query failure.

pub mod counters;
pub mod extract;
pub mod normalize;
pub mod restore;
pub mod token;

pub use counters::PlaceholderCounters;
pub use extract::CategoryValues;
pub use normalize::{normalize_query, split_prefixes, NormalizedQuery, CURRENCY_TICKERS};
pub use restore::restore_template;
pub use token::{Category, PlaceholderToken};
