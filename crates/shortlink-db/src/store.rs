use crate::urls;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shortlink_core::{CreateOutcome, DurableStore, ResolvedTarget, StoreError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

/// [`DurableStore`] backed by the PostgreSQL `urls` table
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run all database migrations (versioned, tracked in `_sqlx_migrations`)
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        info!("Running database migrations...");
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl DurableStore for PgStore {
    async fn lookup(&self, alias: &str) -> Result<Option<ResolvedTarget>, StoreError> {
        let Some(row) = urls::get(&self.pool, alias)
            .await
            .map_err(StoreError::backend)?
        else {
            return Ok(None);
        };

        if row.is_expired(Utc::now()) {
            urls::delete_if_expired(&self.pool, alias)
                .await
                .map_err(StoreError::backend)?;
            debug!(alias = %alias, "Deleted expired alias");
            return Ok(None);
        }

        Ok(Some(ResolvedTarget {
            target: row.url,
            expires_at: row.expires_at,
        }))
    }

    async fn create(
        &self,
        alias: &str,
        target: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CreateOutcome, StoreError> {
        let created_at = urls::insert(&self.pool, alias, target, expires_at)
            .await
            .map_err(StoreError::backend)?;

        Ok(match created_at {
            Some(created_at) => CreateOutcome::Created(created_at),
            None => CreateOutcome::Conflict,
        })
    }

    async fn delete(&self, alias: &str) -> Result<bool, StoreError> {
        urls::delete(&self.pool, alias)
            .await
            .map_err(StoreError::backend)
    }

    async fn increment_usage(&self, alias: &str, count: i64) -> Result<(), StoreError> {
        debug!(alias = %alias, count, "Incrementing used column");
        urls::increment_used(&self.pool, alias, count)
            .await
            .map_err(StoreError::backend)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        urls::count(&self.pool).await.map_err(StoreError::backend)
    }
}
