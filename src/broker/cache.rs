//! In-memory translation cache with TTL and insertion-order eviction.
//! Key: blake3 hash of (transport, model, source lang, target lang, text).
//! Reads never refresh an entry's position, so eviction is strictly FIFO.

use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::protocol::Transport;

pub type CacheKey = [u8; 32];

/// Reusable outcome of one transport run. Model and transport are part of
/// the key, so only the payload travels with the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTranslation {
    pub translated_text: String,
    pub latency_ms: u64,
}

struct CacheEntry {
    result: CachedTranslation,
    inserted_at: Instant,
}

pub struct TranslationCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl TranslationCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            // Unbounded store; capacity is enforced after expired entries
            // have been pruned, so a live entry is never evicted in favor of
            // a dead one.
            inner: Mutex::new(LruCache::unbounded()),
            capacity,
            ttl,
        }
    }

    /// Compute the cache key from translation parameters. Fields are
    /// length-prefixed so adjacent values cannot collide by concatenation.
    pub fn compute_key(
        transport: Transport,
        model: &str,
        source_lang: &str,
        target_lang: &str,
        text: &str,
    ) -> CacheKey {
        let mut hasher = blake3::Hasher::new();
        for field in [transport.as_str(), model, source_lang, target_lang, text] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }

    /// Look up a cached translation. Returns None if absent or expired.
    pub fn get(&self, key: &CacheKey) -> Option<CachedTranslation> {
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.peek(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.result.clone());
            }
            // Expired, drop it.
            cache.pop(key);
        }
        None
    }

    /// Insert a translation, pruning expired entries first and then evicting
    /// the oldest-inserted entries until the capacity holds.
    pub fn insert(&self, key: CacheKey, result: CachedTranslation) {
        let mut cache = self.inner.lock();
        let expired: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            cache.pop(&key);
        }
        cache.put(
            key,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
        while cache.len() > self.capacity {
            cache.pop_lru();
        }
    }
}
