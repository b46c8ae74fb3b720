//! Cache provider: key→value store with TTL and pattern-based key listing.
//!
//! The cache is an explicitly constructed, injected instance — never an
//! ambient global. One [`MemoryCache`] is built per process and passed by
//! reference into the assembler.
//!
//! Entries expire by TTL (checked on read) and the total entry count is
//! bounded LRU-style: when full, the least-recently-read live entry is
//! evicted after expired entries have been purged.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use globset::Glob;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Key→value cache with TTL. Implementations must be safe for concurrent use.
pub trait CacheProvider: Send + Sync {
    /// Get the raw value for a key, or `None` if absent or expired.
    fn get_value(&self, key: &str) -> Option<Value>;

    /// Store a value with a TTL in seconds.
    fn set_value(&self, key: &str, value: Value, ttl_secs: u64);

    /// Delete a key. No-op if absent.
    fn del(&self, key: &str);

    /// List live keys, optionally filtered by a glob pattern
    /// (e.g. `"slice:*"`).
    fn keys(&self, pattern: Option<&str>) -> Vec<String>;

    /// Drop everything.
    fn clear(&self);
}

/// Typed convenience layer over [`CacheProvider`].
pub trait CacheExt: CacheProvider {
    /// Get and deserialize a value. Deserialization failure reads as a miss.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_value(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Serialize and store a value. Serialization failure is dropped with a
    /// trace — a cache write must never fail a turn.
    fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        match serde_json::to_value(value) {
            Ok(v) => self.set_value(key, v, ttl_secs),
            Err(e) => trace!(key, error = %e, "cache serialize failed, skipping write"),
        }
    }
}

impl<C: CacheProvider + ?Sized> CacheExt for C {}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryCache
// ─────────────────────────────────────────────────────────────────────────────

struct Entry {
    value: Value,
    expires_at: Instant,
    last_read: u64,
}

struct Inner {
    map: HashMap<String, Entry>,
    /// Monotone read counter for LRU ordering.
    tick: u64,
}

/// In-memory [`CacheProvider`] with TTL expiry and a bounded entry count.
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl MemoryCache {
    /// Default bound on total entries.
    pub const DEFAULT_MAX_ENTRIES: usize = 2048;

    /// Create a cache with the default entry bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache bounded to `max_entries` live entries.
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                tick: 0,
            }),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of live (unexpired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        let now = Instant::now();
        inner.map.values().filter(|e| e.expires_at > now).count()
    }

    /// Whether the cache holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_for_insert(inner: &mut Inner, max_entries: usize) {
        let now = Instant::now();
        inner.map.retain(|_, e| e.expires_at > now);
        while inner.map.len() >= max_entries {
            let victim = inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.last_read)
                .map(|(k, _)| k.clone());
            match victim {
                Some(k) => {
                    trace!(key = %k, "cache full, evicting least-recently-read");
                    let _ = inner.map.remove(&k);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheProvider for MemoryCache {
    fn get_value(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let now = Instant::now();

        match inner.map.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_read = tick;
                Some(entry.value.clone())
            }
            Some(_) => {
                // Expired — drop on read.
                let _ = inner.map.remove(key);
                None
            }
            None => None,
        }
    }

    fn set_value(&self, key: &str, value: Value, ttl_secs: u64) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.map.contains_key(key) {
            Self::evict_for_insert(&mut inner, self.max_entries);
        }
        let _ = inner.map.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
                last_read: tick,
            },
        );
    }

    fn del(&self, key: &str) {
        let _ = self.inner.lock().map.remove(key);
    }

    fn keys(&self, pattern: Option<&str>) -> Vec<String> {
        let matcher = pattern
            .and_then(|p| Glob::new(p).ok())
            .map(|g| g.compile_matcher());
        let inner = self.inner.lock();
        let now = Instant::now();
        let mut keys: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .filter(|(k, _)| matcher.as_ref().is_none_or(|m| m.is_match(k)))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn clear(&self) {
        self.inner.lock().map.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
