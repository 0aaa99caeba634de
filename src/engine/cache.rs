//! Cache Adapter
//!
//! Key-value cache consulted by the weaver. Values are JSON text; keys are
//! `"{table}:{id}"`. The cache is a best-effort accelerator: the backing
//! store stays the source of truth and stale entries are tolerated.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// One slot per key, `None` for a miss
    async fn get_all(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>>;

    async fn set_all(&self, entries: HashMap<String, String>) -> CacheResult<()>;

    /// Remove keys matching `pattern`, where `*` matches any run of
    /// characters. Returns the number of removed keys.
    async fn flush(&self, pattern: &str) -> CacheResult<u64>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process cache with an optional per-entry TTL.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Option<Duration>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    fn entries(&self) -> CacheResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Backend("cache lock poisoned".to_string()))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheAdapter for MemoryCache {
    async fn get_all(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        let now = Instant::now();
        let mut entries = self.entries()?;
        entries.retain(|_, entry| entry.is_live(now));
        Ok(keys
            .iter()
            .map(|key| entries.get(key).map(|entry| entry.value.clone()))
            .collect())
    }

    async fn set_all(&self, new_entries: HashMap<String, String>) -> CacheResult<()> {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries()?;
        for (key, value) in new_entries {
            entries.insert(key, Entry { value, expires_at });
        }
        Ok(())
    }

    async fn flush(&self, pattern: &str) -> CacheResult<u64> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }
}

/// `*` matches any (possibly empty) run of characters; everything else is literal.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

/// Hit/miss counters for one weaver. Observability only.
#[derive(Debug, Default)]
pub struct CacheStat {
    hit: AtomicU64,
    miss: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatSnapshot {
    pub hit: u64,
    pub miss: u64,
}

impl CacheStat {
    pub fn record_hit(&self) {
        self.hit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.miss.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatSnapshot {
        CacheStatSnapshot {
            hit: self.hit.load(Ordering::Relaxed),
            miss: self.miss.load(Ordering::Relaxed),
        }
    }
}
