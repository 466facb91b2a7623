//! Chainspark semantic query cache.
//!
//! Natural-language questions are expensive to answer (an LLM writes the
//! SPARQL); semantically equivalent phrasings should not pay twice. This
//! crate owns the read/write cache path:
//!
//! ```text
//!  question ──canonicalize──► fingerprint ──exact key──► hit
//!                                  │ miss
//!                                  ▼
//!                         Jaccard scan over the
//!                         cache namespace ────────────► hit / miss
//! ```
//!
//! The store behind it is any [`store::KvStore`]; an in-memory TTL-aware
//! binding ships here for tests and tooling. Template restoration for a
//! hit lives in `chainspark-template`.

pub mod cache;
pub mod patterns;
pub mod semantic;
pub mod similarity;
pub mod store;

pub use cache::{
    CacheConfig, CacheEntry, CacheHit, CacheStats, QueryCache, StoreOutcome, CACHE_KEY_PREFIX,
    COUNTER_KEY_PREFIX,
};
pub use semantic::canonicalize_question;
pub use similarity::{jaccard_similarity, rank_by_similarity, SimilarQuery};
pub use store::{KvStore, MemoryStore, StoreError};
