use parking_lot::Mutex;
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::types::{Fingerprint, Rect};
use crate::utils::Metrics;

#[derive(Debug, Clone)]
struct CacheEntry {
    created_ms: u64,
    translated_text: String,
}

/// Short-lived fingerprint cache that suppresses re-translating the same
/// text at the same place across consecutive frames.
///
/// Entries expire `ttl_ms` after insertion; lookups never refresh them.
/// Expired entries are purged before every membership test.
pub struct TranslationCache {
    ttl_ms: u64,
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    metrics: Option<Metrics>,
}

impl TranslationCache {
    pub fn new(ttl_ms: u64, metrics: Option<Metrics>) -> Self {
        Self {
            ttl_ms,
            entries: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Fingerprint of normalized text at a position, using xxHash3.
    pub fn fingerprint(text: &str, rect: &Rect) -> Fingerprint {
        let text_hash = xxh3_64(text.as_bytes());
        let rect_hash = xxh3_64(rect.serialized().as_bytes());
        Fingerprint(text_hash.wrapping_mul(31) ^ rect_hash)
    }

    /// Purge expired entries, then return the cached translation if any
    pub fn lookup(&self, fingerprint: Fingerprint, now_ms: u64) -> Option<String> {
        let mut entries = self.entries.lock();
        self.purge_locked(&mut entries, now_ms);

        let hit = entries.get(&fingerprint).map(|e| e.translated_text.clone());
        if let Some(ref m) = self.metrics {
            if hit.is_some() {
                m.record_cache_hit();
            } else {
                m.record_cache_miss();
            }
            m.update_cache_size(entries.len());
        }
        hit
    }

    pub fn insert(&self, fingerprint: Fingerprint, translated_text: String, now_ms: u64) {
        let mut entries = self.entries.lock();
        entries.insert(
            fingerprint,
            CacheEntry {
                created_ms: now_ms,
                translated_text,
            },
        );
        if let Some(ref m) = self.metrics {
            m.update_cache_size(entries.len());
        }
    }

    /// Drop entries older than the TTL; returns how many were removed
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let mut entries = self.entries.lock();
        let removed = self.purge_locked(&mut entries, now_ms);
        if let Some(ref m) = self.metrics {
            m.update_cache_size(entries.len());
        }
        removed
    }

    fn purge_locked(&self, entries: &mut HashMap<Fingerprint, CacheEntry>, now_ms: u64) -> usize {
        let before = entries.len();
        let ttl = self.ttl_ms;
        entries.retain(|_, e| now_ms.saturating_sub(e.created_ms) <= ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        if let Some(ref m) = self.metrics {
            m.update_cache_size(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Rect {
        Rect::new(40, 40, 240, 140)
    }

    #[test]
    fn test_fingerprint_depends_on_text_and_position() {
        let a = TranslationCache::fingerprint("HELLO THERE", &rect());
        let b = TranslationCache::fingerprint("HELLO THERE", &rect());
        let moved = TranslationCache::fingerprint("HELLO THERE", &rect().offset(1, 0));
        let other = TranslationCache::fingerprint("HELLO", &rect());

        assert_eq!(a, b);
        assert_ne!(a, moved);
        assert_ne!(a, other);
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = TranslationCache::new(800, None);
        let fp = TranslationCache::fingerprint("HELLO", &rect());
        cache.insert(fp, "HALO".to_string(), 1_000);

        assert_eq!(cache.lookup(fp, 1_300), Some("HALO".to_string()));
        assert_eq!(cache.lookup(fp, 1_800), Some("HALO".to_string()));
    }

    #[test]
    fn test_expired_entry_is_purged_before_lookup() {
        let cache = TranslationCache::new(800, None);
        let fp = TranslationCache::fingerprint("HELLO", &rect());
        cache.insert(fp, "HALO".to_string(), 1_000);

        assert_eq!(cache.lookup(fp, 1_801), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_does_not_refresh() {
        let cache = TranslationCache::new(800, None);
        let fp = TranslationCache::fingerprint("HELLO", &rect());
        cache.insert(fp, "HALO".to_string(), 0);

        assert!(cache.lookup(fp, 700).is_some());
        // Still measured from insertion
        assert!(cache.lookup(fp, 900).is_none());
    }

    #[test]
    fn test_purge_expired_counts_and_updates_metrics() {
        let metrics = Metrics::new();
        let cache = TranslationCache::new(100, Some(metrics.clone()));
        cache.insert(Fingerprint(1), "a".into(), 0);
        cache.insert(Fingerprint(2), "b".into(), 50);

        assert_eq!(cache.purge_expired(120), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(metrics.snapshot().cache_size, 1);
    }

    #[test]
    fn test_clear() {
        let cache = TranslationCache::new(800, None);
        cache.insert(Fingerprint(7), "x".into(), 0);
        cache.clear();
        assert!(cache.lookup(Fingerprint(7), 0).is_none());
    }
}
