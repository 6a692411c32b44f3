//! Metrics reported by the caches and the write-back pipeline

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Destination for cache and pipeline metrics.
///
/// Values reported here are never read back by the caches to make decisions.
pub trait MetricsSink: Send + Sync {
    fn cache_hit(&self);
    fn cache_miss(&self);
    fn set_cache_size(&self, size: usize);
    fn set_artifact_entries(&self, entries: usize);
    fn add_artifact_bytes(&self, bytes: u64);
    fn sub_artifact_bytes(&self, bytes: u64);
    fn add_url_count(&self, count: u64);
    fn usage_applied(&self);
    fn usage_failed(&self);
}

/// Point-in-time view of [`CacheMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub url_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_size: u64,
    pub artifact_entries: u64,
    pub artifact_bytes: u64,
    pub usage_applied: u64,
    pub usage_failed: u64,
}

/// In-process metrics backed by atomic counters
#[derive(Debug, Default)]
pub struct CacheMetrics {
    url_count: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_size: AtomicU64,
    artifact_entries: AtomicU64,
    artifact_bytes: AtomicU64,
    usage_applied: AtomicU64,
    usage_failed: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            url_count: self.url_count.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_size: self.cache_size.load(Ordering::Relaxed),
            artifact_entries: self.artifact_entries.load(Ordering::Relaxed),
            artifact_bytes: self.artifact_bytes.load(Ordering::Relaxed),
            usage_applied: self.usage_applied.load(Ordering::Relaxed),
            usage_failed: self.usage_failed.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for CacheMetrics {
    fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn set_cache_size(&self, size: usize) {
        self.cache_size.store(size as u64, Ordering::Relaxed);
    }

    fn set_artifact_entries(&self, entries: usize) {
        self.artifact_entries.store(entries as u64, Ordering::Relaxed);
    }

    fn add_artifact_bytes(&self, bytes: u64) {
        self.artifact_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn sub_artifact_bytes(&self, bytes: u64) {
        // Saturate so a file resized behind our back cannot wrap the gauge
        let _ = self
            .artifact_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    fn add_url_count(&self, count: u64) {
        self.url_count.fetch_add(count, Ordering::Relaxed);
    }

    fn usage_applied(&self) {
        self.usage_applied.fetch_add(1, Ordering::Relaxed);
    }

    fn usage_failed(&self) {
        self.usage_failed.fetch_add(1, Ordering::Relaxed);
    }
}
