//! Durable store seam and an in-memory implementation

use crate::error::StoreError;
use crate::types::{CreateOutcome, ResolvedTarget};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Authoritative alias → target mapping.
///
/// `lookup` reports an expired alias as absent and hands back the expiry of a
/// live one so callers caching the target can honour it. `create` reports an
/// existing alias as [`CreateOutcome::Conflict`] rather than an error.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn lookup(&self, alias: &str) -> Result<Option<ResolvedTarget>, StoreError>;

    async fn create(
        &self,
        alias: &str,
        target: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CreateOutcome, StoreError>;

    /// Returns whether a row was deleted
    async fn delete(&self, alias: &str) -> Result<bool, StoreError>;

    async fn increment_usage(&self, alias: &str, count: i64) -> Result<(), StoreError>;

    /// Number of registered aliases
    async fn count(&self) -> Result<i64, StoreError>;
}

#[derive(Debug, Clone)]
struct StoredLink {
    target: String,
    expires_at: Option<DateTime<Utc>>,
    used: i64,
}

/// Process-local store for development and tests; nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    links: RwLock<HashMap<String, StoredLink>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current usage counter for an alias
    pub async fn usage(&self, alias: &str) -> Option<i64> {
        self.links.read().await.get(alias).map(|link| link.used)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn lookup(&self, alias: &str) -> Result<Option<ResolvedTarget>, StoreError> {
        let mut links = self.links.write().await;

        let expired = match links.get(alias) {
            None => return Ok(None),
            Some(link) => link.expires_at.is_some_and(|at| at < Utc::now()),
        };

        if expired {
            debug!(alias = %alias, "Alias expired, removing");
            links.remove(alias);
            return Ok(None);
        }
        Ok(links.get(alias).map(|link| ResolvedTarget {
            target: link.target.clone(),
            expires_at: link.expires_at,
        }))
    }

    async fn create(
        &self,
        alias: &str,
        target: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CreateOutcome, StoreError> {
        let mut links = self.links.write().await;

        if links.contains_key(alias) {
            return Ok(CreateOutcome::Conflict);
        }

        let created_at = Utc::now();
        links.insert(
            alias.to_string(),
            StoredLink {
                target: target.to_string(),
                expires_at,
                used: 1,
            },
        );
        Ok(CreateOutcome::Created(created_at))
    }

    async fn delete(&self, alias: &str) -> Result<bool, StoreError> {
        Ok(self.links.write().await.remove(alias).is_some())
    }

    async fn increment_usage(&self, alias: &str, count: i64) -> Result<(), StoreError> {
        if let Some(link) = self.links.write().await.get_mut(alias) {
            link.used += count;
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.links.read().await.len() as i64)
    }
}
