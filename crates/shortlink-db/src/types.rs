use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Row of the `urls` table
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UrlRow {
    pub id: i64,
    pub url: String,
    pub alias: String,
    pub created_at: DateTime<Utc>,
    pub used: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UrlRow {
    /// Whether the alias has passed its expiry at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}
