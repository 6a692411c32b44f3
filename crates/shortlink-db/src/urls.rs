use crate::types::UrlRow;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Insert a new alias. Returns `None` if the alias already exists.
pub async fn insert(
    pool: &PgPool,
    alias: &str,
    url: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
        r#"
        INSERT INTO urls (url, alias, created_at, expires_at)
        VALUES ($1, $2, NOW(), $3)
        ON CONFLICT (alias) DO NOTHING
        RETURNING created_at
        "#,
    )
    .bind(url)
    .bind(alias)
    .bind(expires_at)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}

/// Get the row for an alias
pub async fn get(pool: &PgPool, alias: &str) -> Result<Option<UrlRow>, sqlx::Error> {
    sqlx::query_as::<_, UrlRow>(
        "SELECT id, url, alias, created_at, used, expires_at FROM urls WHERE alias = $1",
    )
    .bind(alias)
    .fetch_optional(pool)
    .await
}

/// Delete an alias, returning whether a row was removed
pub async fn delete(pool: &PgPool, alias: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM urls WHERE alias = $1")
        .bind(alias)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete an alias only if it has expired, so a concurrent re-create survives
pub async fn delete_if_expired(pool: &PgPool, alias: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM urls WHERE alias = $1 AND expires_at < NOW()")
        .bind(alias)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Add `count` to the usage counter of an alias
pub async fn increment_used(pool: &PgPool, alias: &str, count: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE urls SET used = used + $1 WHERE alias = $2")
        .bind(count)
        .bind(alias)
        .execute(pool)
        .await?;
    Ok(())
}

/// Number of stored aliases
pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM urls")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
