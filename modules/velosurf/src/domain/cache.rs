//! Per-entity instance cache keyed by primary-key tuple

use crate::config::CachingConfig;
use crate::contract::CacheKey;
use super::instance::Instance;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caching policy of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachingPolicy {
    /// Nothing is cached
    #[default]
    None,
    /// Bounded by size (0 = unbounded) and optional time to live
    Soft {
        size: usize,
        ttl: Option<Duration>,
    },
    /// Whole table preloaded at startup and kept
    Full,
}

impl From<CachingConfig> for CachingPolicy {
    fn from(config: CachingConfig) -> Self {
        match config {
            CachingConfig::None => Self::None,
            CachingConfig::Soft { size, ttl } => Self::Soft { size, ttl },
            CachingConfig::Full => Self::Full,
        }
    }
}

struct CacheEntry {
    instance: Arc<Instance>,
    inserted: Instant,
}

/// Key -> instance map; at most one instance per key
pub struct Cache {
    policy: CachingPolicy,
    // Insertion order doubles as eviction order
    entries: Mutex<IndexMap<CacheKey, CacheEntry>>,
}

impl Cache {
    pub fn new(policy: CachingPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn policy(&self) -> CachingPolicy {
        self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.policy != CachingPolicy::None
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Instance>> {
        let mut entries = self.entries.lock();
        let entry = entries.get(key)?;
        if let CachingPolicy::Soft { ttl: Some(ttl), .. } = self.policy {
            if entry.inserted.elapsed() >= ttl {
                entries.shift_remove(key);
                return None;
            }
        }
        Some(entry.instance.clone())
    }

    pub fn put(&self, key: CacheKey, instance: Arc<Instance>) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.lock();
        entries.shift_remove(&key);
        entries.insert(
            key,
            CacheEntry {
                instance,
                inserted: Instant::now(),
            },
        );
        if let CachingPolicy::Soft { size, .. } = self.policy {
            while size > 0 && entries.len() > size {
                entries.shift_remove_index(0);
            }
        }
    }

    /// Drop one entry; returns whether it was present
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.lock().shift_remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
