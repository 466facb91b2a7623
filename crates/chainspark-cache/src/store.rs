//! Key/value store collaborator contract, plus an in-memory binding.
//!
//! The cache only needs a handful of primitives with TTL support. A
//! production deployment binds these to an external store; the in-memory
//! implementation here backs tests and the CLI. Required atomicity is
//! deliberately thin: `incr` must be atomic, and a lost existence-check /
//! `setex` race merely wastes one write.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store i/o failed: {0}")]
    Io(String),
    #[error("value at {key} is not a counter")]
    NotACounter { key: String },
}

/// Async key/value operations the cache consumes.
///
/// `scan_keys` stands in for the store's native key iterator; `pattern`
/// supports a single trailing `*` wildcard, which is all the cache uses.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Health probe. Returns `false` on failure, never an error.
    async fn ping(&self) -> bool;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<(), StoreError>;
    /// Atomic increment. Missing keys start at 0; returns the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// TTL-aware in-memory store.
///
/// Expired slots are dropped lazily on access. The single lock is held
/// only across map operations, never across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(&self) {
        self.slots.write().retain(|_, slot| slot.live());
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.slots.read().get(key).is_some_and(|s| s.live()))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .slots
            .read()
            .get(key)
            .filter(|s| s.live())
            .map(|s| s.value.clone()))
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<(), StoreError> {
        self.slots.write().insert(
            key.to_string(),
            Slot {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut slots = self.slots.write();
        let current = match slots.get(key).filter(|s| s.live()) {
            Some(slot) => std::str::from_utf8(&slot.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| StoreError::NotACounter {
                    key: key.to_string(),
                })?,
            None => 0,
        };
        let next = current + 1;
        let expires_at = slots.get(key).and_then(|s| s.expires_at);
        slots.insert(
            key.to_string(),
            Slot {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(key).filter(|s| s.live()) {
            slot.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.purge_expired();
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let mut keys: Vec<String> = self
            .slots
            .read()
            .keys()
            .filter(|k| {
                if pattern.ends_with('*') {
                    k.starts_with(prefix)
                } else {
                    k.as_str() == pattern
                }
            })
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut slots = self.slots.write();
        Ok(keys.iter().filter(|k| slots.remove(*k).is_some()).count())
    }
}
