//! The semantic query cache.
//!
//! Write path: canonicalize the question, check for an existing entry
//! (duplicates are an outcome, not an error), `setex` the entry JSON.
//! Read path: exact canonical key first, then a Jaccard scan fallback.
//! Popularity lives under a sibling counter key so the entry value itself
//! never has to be rewritten on a hit.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::semantic::canonicalize_question;
use crate::similarity::{rank_by_similarity, SimilarQuery};
use crate::store::{KvStore, StoreError};

/// Namespace for cache entries. Must stay stable across releases: keys
/// derived from it address the live corpus.
pub const CACHE_KEY_PREFIX: &str = "chainspark:qcache:";
/// Namespace for popularity counters. Distinct from the entry namespace.
pub const COUNTER_KEY_PREFIX: &str = "chainspark:qcount:";

/// The persisted cache value. Round-trips losslessly through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SPARQL template (placeholder-bearing) or concrete query.
    pub sparql_query: String,
    /// Result bindings captured at write time, if the writer had them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    pub original_query: String,
    pub normalized_query: String,
    pub is_sequential: bool,
    pub precached: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        sparql_query: String,
        original_query: String,
        normalized_query: String,
        is_sequential: bool,
        precached: bool,
    ) -> Self {
        Self {
            sparql_query,
            results: None,
            original_query,
            normalized_query,
            is_sequential,
            precached,
            created_at: Utc::now(),
        }
    }

    pub fn with_results(mut self, results: serde_json::Value) -> Self {
        self.results = Some(results);
        self
    }
}

/// Outcome of a cache write. A key that already exists is reported, not
/// raised: a duplicate write is wasted effort, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    Duplicate,
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub key: String,
    pub entry: CacheEntry,
    /// 1.0 for an exact canonical-key hit; the Jaccard score otherwise.
    pub similarity: f64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// Minimum Jaccard score for the similarity fallback on lookups.
    pub similarity_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
            similarity_threshold: 0.6,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub exact_hits: u64,
    pub similarity_hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub duplicates: u64,
}

pub struct QueryCache<S: KvStore> {
    store: S,
    config: CacheConfig,
    stats: RwLock<CacheStats>,
}

impl<S: KvStore> QueryCache<S> {
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn entry_key(canonical: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{canonical}")
    }

    pub fn counter_key(canonical: &str) -> String {
        format!("{COUNTER_KEY_PREFIX}{canonical}")
    }

    /// Health probe; `false` on any store failure, never an error.
    pub async fn ping(&self) -> bool {
        self.store.ping().await
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Look a question up: exact canonical key first, then the similarity
    /// fallback over the whole namespace.
    pub async fn lookup(&self, question: &str) -> Result<Option<CacheHit>, StoreError> {
        let canonical = canonicalize_question(question);
        let key = Self::entry_key(&canonical);

        if let Some(bytes) = self.store.get(&key).await? {
            if let Some(entry) = decode_entry(&key, &bytes) {
                debug!(key = key.as_str(), "exact cache hit");
                self.stats.write().exact_hits += 1;
                self.bump_popularity(&canonical).await;
                return Ok(Some(CacheHit {
                    key,
                    entry,
                    similarity: 1.0,
                }));
            }
        }

        let entries = self.scan_entries().await?;
        let mut ranked = rank_by_similarity(
            &canonical,
            entries.into_iter().map(|(_, e)| e),
            1,
            self.config.similarity_threshold,
        );
        if let Some(best) = ranked.pop() {
            debug!(
                score = best.similarity_score,
                normalized = best.normalized_query.as_str(),
                "similarity cache hit"
            );
            self.stats.write().similarity_hits += 1;
            self.bump_popularity(&best.normalized_query).await;
            let key = Self::entry_key(&best.normalized_query);
            let entry = CacheEntry::new(
                best.sparql_query,
                best.original_query,
                best.normalized_query,
                best.is_sequential,
                best.precached,
            );
            return Ok(Some(CacheHit {
                key,
                entry,
                similarity: best.similarity_score,
            }));
        }

        self.stats.write().misses += 1;
        Ok(None)
    }

    /// Rank cached entries against a question; also used for few-shot
    /// example selection when composing LLM prompts.
    pub async fn find_similar_queries(
        &self,
        question: &str,
        top_n: usize,
        min_similarity: f64,
    ) -> Result<Vec<SimilarQuery>, StoreError> {
        let canonical = canonicalize_question(question);
        let entries = self.scan_entries().await?;
        Ok(rank_by_similarity(
            &canonical,
            entries.into_iter().map(|(_, e)| e),
            top_n,
            min_similarity,
        ))
    }

    /// Write an entry for a question. The existence check accepts a narrow
    /// race window; a concurrent duplicate write is wasted effort only.
    pub async fn store_entry(&self, question: &str, entry: CacheEntry) -> Result<StoreOutcome, StoreError> {
        let canonical = canonicalize_question(question);
        let key = Self::entry_key(&canonical);

        if self.store.exists(&key).await? {
            debug!(key = key.as_str(), "already cached");
            self.stats.write().duplicates += 1;
            return Ok(StoreOutcome::Duplicate);
        }

        let entry = CacheEntry {
            normalized_query: canonical,
            ..entry
        };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| StoreError::Io(format!("encoding cache entry: {e}")))?;
        self.store.setex(&key, self.config.ttl, &bytes).await?;
        self.stats.write().stores += 1;
        Ok(StoreOutcome::Stored)
    }

    /// Current popularity count for a question (0 if never hit).
    pub async fn popularity(&self, question: &str) -> Result<i64, StoreError> {
        let canonical = canonicalize_question(question);
        let key = Self::counter_key(&canonical);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(0);
        };
        Ok(std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0))
    }

    /// Bulk admin clear: both namespaces, returns removed key count.
    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        let mut keys = self
            .store
            .scan_keys(&format!("{CACHE_KEY_PREFIX}*"))
            .await?;
        keys.extend(
            self.store
                .scan_keys(&format!("{COUNTER_KEY_PREFIX}*"))
                .await?,
        );
        if keys.is_empty() {
            return Ok(0);
        }
        self.store.delete(&keys).await
    }

    async fn scan_entries(&self) -> Result<Vec<(String, CacheEntry)>, StoreError> {
        let keys = self
            .store
            .scan_keys(&format!("{CACHE_KEY_PREFIX}*"))
            .await?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            if let Some(entry) = decode_entry(&key, &bytes) {
                entries.push((key, entry));
            }
        }
        Ok(entries)
    }

    /// Popularity bumps ride along on hits; a counter failure must not
    /// fail the lookup that triggered it.
    async fn bump_popularity(&self, canonical: &str) {
        let key = Self::counter_key(canonical);
        match self.store.incr(&key).await {
            Ok(_) => {
                if let Err(e) = self.store.expire(&key, self.config.ttl).await {
                    warn!(key = key.as_str(), error = %e, "failed to refresh counter ttl");
                }
            }
            Err(e) => warn!(key = key.as_str(), error = %e, "failed to bump popularity"),
        }
    }
}

/// A corrupt entry reads as a miss, not a failure: the TTL will retire it.
fn decode_entry(key: &str, bytes: &[u8]) -> Option<CacheEntry> {
    match serde_json::from_slice(bytes) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(key, error = %e, "undecodable cache entry, treating as miss");
            None
        }
    }
}
