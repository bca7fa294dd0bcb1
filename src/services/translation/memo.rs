use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::core::errors::ConfigError;

/// Text-only LRU of successful backend translations.
///
/// Unlike the fingerprint cache it ignores position and never expires; it
/// only saves backend round trips for lines seen before.
pub struct TranslationMemo {
    entries: Mutex<LruCache<String, String>>,
}

impl TranslationMemo {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        let capacity =
            NonZeroUsize::new(capacity).ok_or(ConfigError::InvalidCacheCapacity(capacity))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn get(&self, source: &str) -> Option<String> {
        self.entries.lock().get(source).cloned()
    }

    pub fn put(&self, source: String, translated: String) {
        self.entries.lock().put(source, translated);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
