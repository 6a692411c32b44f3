//! Disk-backed artifact cache with an in-memory, snapshot-able index

use crate::error::{ArtifactCacheError, Result};
use crate::generator::ArtifactGenerator;
use crate::metrics::MetricsSink;
use crate::types::{ArtifactEntry, ArtifactStats, EvictionPolicy};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// A bounded cache of generated artifacts, keyed by alias.
///
/// The index is insertion ordered. Eviction of a victim (including removal of
/// its file) and insertion of the new entry happen under one lock, so readers
/// never see the index above capacity or pointing at a deleted file.
pub struct ArtifactCache {
    /// Alias → artifact metadata, in eviction order
    entries: Mutex<IndexMap<String, ArtifactEntry>>,
    /// Directory where artifact files are written
    cache_dir: PathBuf,
    /// Prefix joined with the alias to form the artifact content
    base_url: String,
    /// Maximum number of indexed artifacts
    capacity: usize,
    policy: EvictionPolicy,
    /// Where the index is saved on shutdown; `None` means wipe on shutdown
    snapshot_path: Option<PathBuf>,
    generator: Arc<dyn ArtifactGenerator>,
    metrics: Arc<dyn MetricsSink>,
    next_id: AtomicU64,
}

impl ArtifactCache {
    /// Create a new artifact cache
    ///
    /// # Errors
    ///
    /// Returns an error if capacity is 0
    pub fn new(
        cache_dir: PathBuf,
        base_url: impl Into<String>,
        capacity: usize,
        generator: Arc<dyn ArtifactGenerator>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(ArtifactCacheError::ZeroCapacity);
        }

        Ok(Self {
            entries: Mutex::new(IndexMap::new()),
            cache_dir,
            base_url: base_url.into(),
            capacity,
            policy: EvictionPolicy::default(),
            snapshot_path: None,
            generator,
            metrics,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_snapshot_path(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    /// Initialize the cache by ensuring the cache directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| ArtifactCacheError::io("create directory", &self.cache_dir, e))?;
        info!(cache_dir = ?self.cache_dir, capacity = self.capacity, policy = %self.policy, "Artifact cache initialized");
        Ok(())
    }

    pub fn content_type(&self) -> &str {
        self.generator.content_type()
    }

    /// The content encoded into the artifact for `alias`
    pub fn target_for(&self, alias: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), alias)
    }

    /// Generate an artifact for `alias` and index it, evicting one entry if full.
    ///
    /// If the alias is already cached its existing path is returned. Failures
    /// are logged here and handed back as an error value; nothing is indexed.
    pub async fn add(&self, alias: &str) -> Result<PathBuf> {
        if let Some(path) = self.find(alias).await {
            return Ok(path);
        }

        match self.generate_and_insert(alias).await {
            Ok(path) => Ok(path),
            Err(e) => {
                error!(alias = %alias, cache_dir = ?self.cache_dir, error = %e, "No artifact produced");
                Err(e)
            }
        }
    }

    async fn generate_and_insert(&self, alias: &str) -> Result<PathBuf> {
        if !matches!(fs::try_exists(&self.cache_dir).await, Ok(true)) {
            return Err(ArtifactCacheError::MissingDirectory(self.cache_dir.clone()));
        }

        let path = self.fresh_path(alias);
        let content = self.target_for(alias);

        if let Err(e) = self.generator.generate(&content, &path).await {
            remove_file_quietly(&path).await;
            return Err(ArtifactCacheError::io("generate", &path, e));
        }

        let size = match fs::metadata(&path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                remove_file_quietly(&path).await;
                return Err(ArtifactCacheError::io("stat", &path, e));
            }
        };

        let mut entries = self.entries.lock().await;

        // Another request generated this alias while we were encoding
        if let Some(existing) = entries.get(alias) {
            let existing = existing.path.clone();
            drop(entries);
            remove_file_quietly(&path).await;
            return Ok(existing);
        }

        if entries.len() >= self.capacity {
            self.evict_one(&mut entries).await;
        }

        entries.insert(
            alias.to_string(),
            ArtifactEntry {
                path: path.clone(),
                size,
                created_at: Utc::now(),
            },
        );
        self.metrics.set_artifact_entries(entries.len());
        self.metrics.add_artifact_bytes(size);
        debug!(alias = %alias, path = ?path, size, "Cached artifact");

        Ok(path)
    }

    /// Remove one entry chosen by the eviction policy, deleting its file
    async fn evict_one(&self, entries: &mut IndexMap<String, ArtifactEntry>) {
        let victim = match self.policy {
            EvictionPolicy::Newest => entries.pop(),
            EvictionPolicy::Oldest | EvictionPolicy::LeastRecentlyUsed => {
                entries.shift_remove_index(0)
            }
        };

        if let Some((alias, entry)) = victim {
            self.remove_backing_file(&alias, &entry).await;
            self.metrics.set_artifact_entries(entries.len());
            debug!(alias = %alias, path = ?entry.path, policy = %self.policy, "Evicted artifact");
        }
    }

    async fn remove_backing_file(&self, alias: &str, entry: &ArtifactEntry) {
        match fs::remove_file(&entry.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(alias = %alias, path = ?entry.path, error = %e, "Failed to remove artifact file");
            }
        }
        self.metrics.sub_artifact_bytes(entry.size);
    }

    /// Look up the artifact path for an alias.
    ///
    /// Only the `LeastRecentlyUsed` policy reorders the index on lookup. An
    /// entry whose file has disappeared is dropped and reported as absent.
    pub async fn find(&self, alias: &str) -> Option<PathBuf> {
        let mut entries = self.entries.lock().await;

        let idx = entries.get_index_of(alias)?;
        let path = entries[idx].path.clone();

        if matches!(fs::try_exists(&path).await, Ok(false)) {
            warn!(alias = %alias, path = ?path, "Artifact file missing, dropping entry");
            if let Some(entry) = entries.shift_remove(alias) {
                self.metrics.sub_artifact_bytes(entry.size);
                self.metrics.set_artifact_entries(entries.len());
            }
            return None;
        }

        if self.policy == EvictionPolicy::LeastRecentlyUsed {
            let last = entries.len() - 1;
            entries.move_index(idx, last);
        }

        Some(path)
    }

    /// Remove an alias and its file. Returns whether an entry was removed.
    pub async fn delete(&self, alias: &str) -> bool {
        let mut entries = self.entries.lock().await;

        match entries.shift_remove(alias) {
            Some(entry) => {
                self.remove_backing_file(alias, &entry).await;
                self.metrics.set_artifact_entries(entries.len());
                debug!(alias = %alias, path = ?entry.path, "Removed artifact");
                true
            }
            None => false,
        }
    }

    /// Delete every artifact file and empty the index
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;

        let count = entries.len();
        for (alias, entry) in entries.drain(..) {
            self.remove_backing_file(&alias, &entry).await;
        }
        self.metrics.set_artifact_entries(0);
        info!(removed = count, cache_dir = ?self.cache_dir, "Cleared artifact cache");
    }

    /// Rehydrate the index from the configured snapshot.
    ///
    /// Returns the number of entries loaded. A missing, unreadable or malformed
    /// snapshot is logged and leaves the index untouched. Entries whose file no
    /// longer exists are skipped; entries beyond capacity have their files
    /// removed so they are not orphaned.
    pub async fn restore(&self) -> usize {
        let Some(snapshot_path) = self.snapshot_path.as_deref() else {
            return 0;
        };

        let raw = match fs::read(snapshot_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = ?snapshot_path, "No artifact cache snapshot found, starting empty");
                return 0;
            }
            Err(e) => {
                warn!(path = ?snapshot_path, error = %e, "Failed to read artifact cache snapshot");
                return 0;
            }
        };

        let snapshot: IndexMap<String, PathBuf> = match serde_json::from_slice(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = ?snapshot_path, error = %e, "Malformed artifact cache snapshot, starting empty");
                return 0;
            }
        };

        let mut entries = self.entries.lock().await;
        let mut loaded = 0;

        for (alias, path) in snapshot {
            if entries.contains_key(&alias) {
                continue;
            }

            // Only files this cache wrote are ever indexed or deleted
            if !self.owns(&path) {
                warn!(alias = %alias, path = ?path, "Skipping snapshot entry outside cache directory");
                continue;
            }

            let metadata = match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    debug!(alias = %alias, path = ?path, error = %e, "Skipping snapshot entry without file");
                    continue;
                }
            };

            if entries.len() >= self.capacity {
                remove_file_quietly(&path).await;
                debug!(alias = %alias, path = ?path, "Dropped snapshot entry beyond capacity");
                continue;
            }

            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            self.metrics.add_artifact_bytes(metadata.len());
            entries.insert(
                alias,
                ArtifactEntry {
                    path,
                    size: metadata.len(),
                    created_at,
                },
            );
            loaded += 1;
        }

        self.metrics.set_artifact_entries(entries.len());
        info!(loaded, path = ?snapshot_path, "Restored artifact cache index");
        loaded
    }

    /// Write the alias → path index to the configured snapshot location.
    ///
    /// Does nothing when no snapshot path is configured.
    pub async fn persist(&self) -> Result<()> {
        let Some(snapshot_path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };

        let result = self.write_snapshot(snapshot_path).await;
        if let Err(e) = &result {
            error!(path = ?snapshot_path, error = %e, "Failed to persist artifact cache index");
        }
        result
    }

    async fn write_snapshot(&self, snapshot_path: &Path) -> Result<()> {
        let snapshot: IndexMap<String, PathBuf> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .map(|(alias, entry)| (alias.clone(), entry.path.clone()))
                .collect()
        };

        let json = serde_json::to_vec_pretty(&snapshot).map_err(|e| {
            ArtifactCacheError::Snapshot {
                path: snapshot_path.to_path_buf(),
                source: Box::new(e),
            }
        })?;

        // Write beside the target and rename so a crash never leaves half a file
        let tmp_path = snapshot_path.with_extension("tmp");
        fs::write(&tmp_path, json)
            .await
            .map_err(|e| ArtifactCacheError::io("write snapshot", &tmp_path, e))?;
        fs::rename(&tmp_path, snapshot_path)
            .await
            .map_err(|e| ArtifactCacheError::io("rename snapshot", snapshot_path, e))?;

        info!(entries = snapshot.len(), path = ?snapshot_path, "Persisted artifact cache index");
        Ok(())
    }

    /// Persist the index if a snapshot path is configured, otherwise wipe the cache
    pub async fn shutdown(&self) -> Result<()> {
        if self.snapshot_path.is_some() {
            self.persist().await
        } else {
            self.clear().await;
            Ok(())
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> ArtifactStats {
        let entries = self.entries.lock().await;
        ArtifactStats {
            entries: entries.len(),
            total_size: entries.values().map(|e| e.size).sum(),
            capacity: self.capacity,
        }
    }

    fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.cache_dir.as_path())
    }

    /// A path no other artifact has used, so regeneration never overwrites a served file
    fn fresh_path(&self, alias: &str) -> PathBuf {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:{}", alias, nanos, seq).as_bytes());
        let name = hex::encode(hasher.finalize());

        self.cache_dir
            .join(format!("{}.{}", &name[..32], self.generator.extension()))
    }
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = ?path, error = %e, "Failed to remove artifact file");
        }
    }
}
