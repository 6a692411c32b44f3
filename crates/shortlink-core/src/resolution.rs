//! In-memory LRU cache of alias → target resolutions

use crate::error::ResolutionCacheError;
use crate::metrics::MetricsSink;
use crate::types::ResolvedTarget;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Thread-safe LRU cache sitting in front of the durable store's read path.
///
/// Every operation takes the single lock once, so a lookup and its promotion,
/// or an eviction and the insertion that caused it, are never observed apart.
/// Entries carry the alias expiry; an expired entry is never served.
pub struct ResolutionCache {
    entries: Mutex<LruCache<String, ResolvedTarget>>,
    metrics: Arc<dyn MetricsSink>,
}

impl ResolutionCache {
    /// Creates a new resolution cache
    ///
    /// # Errors
    ///
    /// Returns an error if capacity is 0
    pub fn new(
        capacity: usize,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ResolutionCacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(ResolutionCacheError::ZeroCapacity)?;

        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            metrics,
        })
    }

    /// Look up the target for an alias, promoting it to most recently used on a hit.
    ///
    /// An entry whose expiry has passed is removed and reported as a miss.
    pub fn find(&self, alias: &str) -> Option<String> {
        let mut entries = self.entries.lock();

        match entries.get(alias) {
            Some(entry) if !entry.is_expired(Utc::now()) => {
                debug!(alias = %alias, "Resolution cache hit");
                self.metrics.cache_hit();
                return Some(entry.target.clone());
            }
            Some(_) => {}
            None => {
                self.metrics.cache_miss();
                return None;
            }
        }

        entries.pop(alias);
        self.metrics.set_cache_size(entries.len());
        self.metrics.cache_miss();
        debug!(alias = %alias, "Cached alias expired, removed");
        None
    }

    /// Insert or overwrite the target for an alias.
    ///
    /// When the cache is full and the alias is new, the least recently used
    /// entry is evicted first.
    pub fn add(&self, alias: &str, target: &str, expires_at: Option<DateTime<Utc>>) {
        let mut entries = self.entries.lock();

        if !entries.contains(alias) && entries.len() == entries.cap().get() {
            if let Some((evicted, _)) = entries.pop_lru() {
                debug!(alias = %evicted, "Evicted alias from resolution cache");
            }
        }

        entries.put(
            alias.to_string(),
            ResolvedTarget {
                target: target.to_string(),
                expires_at,
            },
        );
        self.metrics.set_cache_size(entries.len());
        debug!(alias = %alias, "Cached alias resolution");
    }

    /// Remove an alias if present. Returns whether an entry was removed.
    pub fn delete(&self, alias: &str) -> bool {
        let mut entries = self.entries.lock();

        let removed = entries.pop(alias).is_some();
        if removed {
            self.metrics.set_cache_size(entries.len());
            debug!(alias = %alias, "Invalidated alias in resolution cache");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CacheMetrics;
    use chrono::Duration;
    use std::thread;

    fn cache_with_metrics(capacity: usize) -> (ResolutionCache, Arc<CacheMetrics>) {
        let metrics = Arc::new(CacheMetrics::new());
        let cache = ResolutionCache::new(capacity, metrics.clone()).unwrap();
        (cache, metrics)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = ResolutionCache::new(0, Arc::new(CacheMetrics::new()));
        assert_eq!(result.err(), Some(ResolutionCacheError::ZeroCapacity));
    }

    #[test]
    fn test_add_and_find() {
        let (cache, metrics) = cache_with_metrics(10);

        assert_eq!(cache.find("abc"), None);
        cache.add("abc", "http://example.com", None);
        assert_eq!(cache.find("abc"), Some("http://example.com".to_string()));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_size, 1);
    }

    #[test]
    fn test_lookup_promotes_entry() {
        let (cache, _) = cache_with_metrics(2);

        cache.add("a", "http://a.example", None);
        cache.add("b", "http://b.example", None);
        assert!(cache.find("a").is_some());
        cache.add("c", "http://c.example", None);

        // "b" was touched least recently, not "a"
        assert_eq!(cache.find("b"), None);
        assert_eq!(cache.find("a"), Some("http://a.example".to_string()));
        assert_eq!(cache.find("c"), Some("http://c.example".to_string()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_without_lookup_oldest_is_evicted() {
        let (cache, _) = cache_with_metrics(2);

        cache.add("a", "1", None);
        cache.add("b", "2", None);
        cache.add("c", "3", None);

        assert_eq!(cache.find("a"), None);
        assert!(cache.find("b").is_some());
        assert!(cache.find("c").is_some());
    }

    #[test]
    fn test_overwrite_at_capacity_keeps_other_entries() {
        let (cache, _) = cache_with_metrics(2);

        cache.add("a", "1", None);
        cache.add("b", "2", None);
        cache.add("a", "updated", None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.find("a"), Some("updated".to_string()));
        assert_eq!(cache.find("b"), Some("2".to_string()));
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let (cache, metrics) = cache_with_metrics(5);

        for i in 0..50 {
            cache.add(&format!("alias{}", i), "http://example.com", None);
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.capacity(), 5);
        assert_eq!(metrics.snapshot().cache_size, 5);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let (cache, metrics) = cache_with_metrics(3);

        cache.add("old", "http://old.example", Some(Utc::now() - Duration::seconds(1)));
        cache.add("new", "http://new.example", Some(Utc::now() + Duration::hours(1)));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.find("old"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find("new"), Some("http://new.example".to_string()));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_size, 1);
    }

    #[test]
    fn test_entry_expires_while_cached() {
        let (cache, _) = cache_with_metrics(3);

        cache.add("exp", "http://e.example", Some(Utc::now() + Duration::milliseconds(50)));
        assert!(cache.find("exp").is_some());

        thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(cache.find("exp"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (cache, _) = cache_with_metrics(3);

        cache.add("a", "1", None);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert!(!cache.delete("never-added"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_miss_has_no_side_effects() {
        let (cache, metrics) = cache_with_metrics(3);

        cache.add("a", "1", None);
        assert_eq!(cache.find("zzz"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(metrics.snapshot().cache_size, 1);
    }

    #[test]
    fn test_concurrent_adds_respect_capacity() {
        let metrics = Arc::new(CacheMetrics::new());
        let cache = Arc::new(ResolutionCache::new(8, metrics).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let alias = format!("t{}-{}", t, i);
                        cache.add(&alias, "http://example.com", None);
                        cache.find(&alias);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 8);
    }
}
