//! Read and write paths tying the caches, the store and the write-back together

use crate::alias::generate_alias;
use crate::artifact::ArtifactCache;
use crate::error::{ArtifactCacheError, StoreError};
use crate::metrics::MetricsSink;
use crate::resolution::ResolutionCache;
use crate::store::DurableStore;
use crate::types::CreateOutcome;
use crate::writeback::UsageWriteBack;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum ResolverError {
    /// No alias was supplied and random aliases are disabled
    AliasRequired,
    Store(StoreError),
    Artifact(ArtifactCacheError),
}

impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverError::AliasRequired => write!(f, "Alias must be specified"),
            ResolverError::Store(err) => write!(f, "{}", err),
            ResolverError::Artifact(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ResolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolverError::AliasRequired => None,
            ResolverError::Store(err) => Some(err),
            ResolverError::Artifact(err) => Some(err),
        }
    }
}

impl From<StoreError> for ResolverError {
    fn from(err: StoreError) -> Self {
        ResolverError::Store(err)
    }
}

impl From<ArtifactCacheError> for ResolverError {
    fn from(err: ArtifactCacheError) -> Self {
        ResolverError::Artifact(err)
    }
}

/// A new alias registration
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub target: String,
    pub alias: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct Resolver {
    store: Arc<dyn DurableStore>,
    cache: ResolutionCache,
    artifacts: ArtifactCache,
    writeback: UsageWriteBack,
    metrics: Arc<dyn MetricsSink>,
    random_aliases: bool,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn DurableStore>,
        cache: ResolutionCache,
        artifacts: ArtifactCache,
        writeback: UsageWriteBack,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            store,
            cache,
            artifacts,
            writeback,
            metrics,
            random_aliases: true,
        }
    }

    pub fn with_random_aliases(mut self, enabled: bool) -> Self {
        self.random_aliases = enabled;
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn artifacts(&self) -> &ArtifactCache {
        &self.artifacts
    }

    pub fn writeback(&self) -> &UsageWriteBack {
        &self.writeback
    }

    /// Load startup state: the artifact index snapshot and the URL count gauge
    pub async fn restore(&self) {
        self.artifacts.restore().await;

        match self.store.count().await {
            Ok(count) => self.metrics.add_url_count(count.max(0) as u64),
            Err(e) => warn!(error = %e, "Failed to count stored aliases"),
        }
    }

    /// Resolve an alias to its target, queueing one usage increment on success.
    ///
    /// Expired aliases are absent whether or not they are cached. Store
    /// failures are logged and reported as absent.
    pub async fn resolve(&self, alias: &str) -> Option<String> {
        if let Some(target) = self.cache.find(alias) {
            self.writeback.enqueue(alias);
            return Some(target);
        }

        match self.store.lookup(alias).await {
            Ok(Some(resolved)) => {
                self.cache.add(alias, &resolved.target, resolved.expires_at);
                self.writeback.enqueue(alias);
                Some(resolved.target)
            }
            Ok(None) => {
                debug!(alias = %alias, "Alias not found");
                None
            }
            Err(e) => {
                warn!(alias = %alias, error = %e, "Store lookup failed");
                None
            }
        }
    }

    /// Path of the artifact for an alias, generating it if needed.
    ///
    /// `Ok(None)` means the alias does not exist.
    pub async fn artifact(&self, alias: &str) -> Result<Option<PathBuf>, ResolverError> {
        if let Some(path) = self.artifacts.find(alias).await {
            return Ok(Some(path));
        }

        if self.store.lookup(alias).await?.is_none() {
            return Ok(None);
        }

        Ok(Some(self.artifacts.add(alias).await?))
    }

    /// Register a new alias, generating one when none is given
    pub async fn create(
        &self,
        request: CreateRequest,
    ) -> Result<(String, CreateOutcome), ResolverError> {
        let alias = match request.alias {
            Some(alias) => alias,
            None if self.random_aliases => generate_alias(&request.target),
            None => return Err(ResolverError::AliasRequired),
        };

        let outcome = self
            .store
            .create(&alias, &request.target, request.expires_at)
            .await?;

        if let CreateOutcome::Created(_) = outcome {
            self.metrics.add_url_count(1);
            info!(alias = %alias, "Created alias");
        }
        Ok((alias, outcome))
    }

    /// Delete an alias upstream and invalidate both caches.
    ///
    /// Returns whether the store held the alias.
    pub async fn delete(&self, alias: &str) -> Result<bool, ResolverError> {
        let deleted = self.store.delete(alias).await?;

        self.cache.delete(alias);
        self.artifacts.delete(alias).await;

        if deleted {
            info!(alias = %alias, "Deleted alias");
        }
        Ok(deleted)
    }

    /// Drain the write-back queue, then persist or wipe the artifact cache
    pub async fn shutdown(&self) {
        self.writeback.shutdown().await;

        // Already logged by the cache; shutdown continues regardless
        let _ = self.artifacts.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ArtifactGenerator;
    use crate::metrics::CacheMetrics;
    use crate::store::MemoryStore;
    use crate::types::ResolvedTarget;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    struct TextGenerator;

    #[async_trait]
    impl ArtifactGenerator for TextGenerator {
        async fn generate(&self, content: &str, path: &Path) -> std::io::Result<()> {
            tokio::fs::write(path, content).await
        }
    }

    /// Wraps a store and counts lookups
    struct CountingStore {
        inner: MemoryStore,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl DurableStore for CountingStore {
        async fn lookup(&self, alias: &str) -> Result<Option<ResolvedTarget>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup(alias).await
        }

        async fn create(
            &self,
            alias: &str,
            target: &str,
            expires_at: Option<DateTime<Utc>>,
        ) -> Result<CreateOutcome, StoreError> {
            self.inner.create(alias, target, expires_at).await
        }

        async fn delete(&self, alias: &str) -> Result<bool, StoreError> {
            self.inner.delete(alias).await
        }

        async fn increment_usage(&self, alias: &str, count: i64) -> Result<(), StoreError> {
            self.inner.increment_usage(alias, count).await
        }

        async fn count(&self) -> Result<i64, StoreError> {
            self.inner.count().await
        }
    }

    struct Fixture {
        resolver: Resolver,
        store: Arc<CountingStore>,
        metrics: Arc<CacheMetrics>,
        _dir: TempDir,
    }

    async fn fixture(cache_size: usize, artifact_size: usize) -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            lookups: AtomicUsize::new(0),
        });
        let metrics = Arc::new(CacheMetrics::new());

        let cache = ResolutionCache::new(cache_size, metrics.clone()).unwrap();
        let artifacts = ArtifactCache::new(
            dir.path().to_path_buf(),
            "http://localhost:8000/find",
            artifact_size,
            Arc::new(TextGenerator),
            metrics.clone(),
        )
        .unwrap();
        artifacts.init().await.unwrap();
        let writeback = UsageWriteBack::start(store.clone(), metrics.clone());

        let resolver = Resolver::new(store.clone(), cache, artifacts, writeback, metrics.clone());
        Fixture {
            resolver,
            store,
            metrics,
            _dir: dir,
        }
    }

    fn request(alias: &str, target: &str) -> CreateRequest {
        CreateRequest {
            target: target.to_string(),
            alias: Some(alias.to_string()),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_resolution_populates_cache_and_queues_usage() {
        let f = fixture(100, 10).await;
        f.resolver
            .create(request("abc", "http://example.com"))
            .await
            .unwrap();

        assert_eq!(f.resolver.cache().find("abc"), None);

        assert_eq!(
            f.resolver.resolve("abc").await,
            Some("http://example.com".to_string())
        );
        assert_eq!(f.store.lookups.load(Ordering::SeqCst), 1);

        assert_eq!(
            f.resolver.resolve("abc").await,
            Some("http://example.com".to_string())
        );
        // Served from cache
        assert_eq!(f.store.lookups.load(Ordering::SeqCst), 1);

        f.resolver.shutdown().await;
        assert_eq!(f.resolver.writeback().stats().enqueued, 2);
        assert_eq!(f.store.inner.usage("abc").await, Some(3));
    }

    #[tokio::test]
    async fn test_alias_expiring_while_cached_stops_resolving() {
        let f = fixture(100, 10).await;
        f.resolver
            .create(CreateRequest {
                target: "http://e.example".to_string(),
                alias: Some("exp".to_string()),
                expires_at: Some(Utc::now() + chrono::Duration::milliseconds(300)),
            })
            .await
            .unwrap();

        assert_eq!(
            f.resolver.resolve("exp").await,
            Some("http://e.example".to_string())
        );
        assert_eq!(f.resolver.cache().len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;

        assert_eq!(f.resolver.resolve("exp").await, None);
        assert!(f.resolver.cache().is_empty());
        assert_eq!(f.store.inner.lookup("exp").await.unwrap(), None);

        f.resolver.shutdown().await;
        assert_eq!(f.resolver.writeback().stats().enqueued, 1);
    }

    #[tokio::test]
    async fn test_unknown_alias_queues_nothing() {
        let f = fixture(100, 10).await;

        assert_eq!(f.resolver.resolve("nope").await, None);
        assert!(f.resolver.cache().is_empty());
        assert_eq!(f.resolver.writeback().stats().enqueued, 0);
    }

    #[tokio::test]
    async fn test_create_reports_conflict() {
        let f = fixture(10, 10).await;

        let (alias, outcome) = f
            .resolver
            .create(request("abc", "http://a.example"))
            .await
            .unwrap();
        assert_eq!(alias, "abc");
        assert!(matches!(outcome, CreateOutcome::Created(_)));

        let (_, outcome) = f
            .resolver
            .create(request("abc", "http://b.example"))
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Conflict);
        assert_eq!(f.metrics.snapshot().url_count, 1);
    }

    #[tokio::test]
    async fn test_create_generates_alias_when_enabled() {
        let f = fixture(10, 10).await;

        let (alias, outcome) = f
            .resolver
            .create(CreateRequest {
                target: "http://example.com".to_string(),
                alias: None,
                expires_at: None,
            })
            .await
            .unwrap();

        assert_eq!(alias.len(), 5);
        assert!(matches!(outcome, CreateOutcome::Created(_)));
        assert!(f.resolver.resolve(&alias).await.is_some());
    }

    #[tokio::test]
    async fn test_create_requires_alias_when_random_disabled() {
        let f = fixture(10, 10).await;
        let resolver = f.resolver.with_random_aliases(false);

        let result = resolver
            .create(CreateRequest {
                target: "http://example.com".to_string(),
                alias: None,
                expires_at: None,
            })
            .await;
        assert!(matches!(result, Err(ResolverError::AliasRequired)));
    }

    #[tokio::test]
    async fn test_artifact_for_unknown_alias_is_absent() {
        let f = fixture(10, 10).await;

        assert!(f.resolver.artifact("nope").await.unwrap().is_none());
        assert!(f.resolver.artifacts().is_empty().await);
    }

    #[tokio::test]
    async fn test_artifact_generated_once() {
        let f = fixture(10, 10).await;
        f.resolver
            .create(request("abc", "http://example.com"))
            .await
            .unwrap();

        let first = f.resolver.artifact("abc").await.unwrap().unwrap();
        let second = f.resolver.artifact("abc").await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(
            std::fs::read_to_string(&first).unwrap(),
            "http://localhost:8000/find/abc"
        );
        // Second request never reached the store
        assert_eq!(f.store.lookups.load(Ordering::SeqCst), 1);
        // Artifact requests are not resolutions
        assert_eq!(f.resolver.writeback().stats().enqueued, 0);
    }

    #[tokio::test]
    async fn test_delete_invalidates_both_caches() {
        let f = fixture(10, 10).await;
        f.resolver
            .create(request("abc", "http://example.com"))
            .await
            .unwrap();
        f.resolver.resolve("abc").await.unwrap();
        let path = f.resolver.artifact("abc").await.unwrap().unwrap();

        assert!(f.resolver.delete("abc").await.unwrap());

        assert_eq!(f.resolver.cache().find("abc"), None);
        assert_eq!(f.resolver.artifacts().find("abc").await, None);
        assert!(!path.exists());
        assert_eq!(f.resolver.resolve("abc").await, None);

        assert!(!f.resolver.delete("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_seeds_url_count() {
        let f = fixture(10, 10).await;
        f.store
            .inner
            .create("a", "http://a.example", None)
            .await
            .unwrap();
        f.store
            .inner
            .create("b", "http://b.example", None)
            .await
            .unwrap();

        f.resolver.restore().await;
        assert_eq!(f.metrics.snapshot().url_count, 2);
    }

    #[tokio::test]
    async fn test_shutdown_wipes_artifacts_without_snapshot() {
        let f = fixture(10, 10).await;
        f.resolver
            .create(request("abc", "http://example.com"))
            .await
            .unwrap();
        let path = f.resolver.artifact("abc").await.unwrap().unwrap();

        f.resolver.shutdown().await;

        assert!(!path.exists());
        assert!(f.resolver.artifacts().is_empty().await);
    }
}
