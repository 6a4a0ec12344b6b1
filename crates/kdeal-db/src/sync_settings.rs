//! The singleton `sync_settings` row.
//!
//! Environment configuration takes precedence; these values are the
//! fallbacks editable at runtime.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncSettingsRow {
    pub feed_url: Option<String>,
    pub seo_title_template: Option<String>,
    pub sync_enabled: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Returns the settings row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the seed row was removed, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_sync_settings(pool: &PgPool) -> Result<SyncSettingsRow, DbError> {
    sqlx::query_as::<_, SyncSettingsRow>(
        "SELECT feed_url, seo_title_template, sync_enabled, last_sync_at, updated_at \
         FROM sync_settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Overwrite the editable settings. `None` clears a value.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn update_sync_settings(
    pool: &PgPool,
    feed_url: Option<&str>,
    seo_title_template: Option<&str>,
    sync_enabled: bool,
) -> Result<SyncSettingsRow, DbError> {
    let row = sqlx::query_as::<_, SyncSettingsRow>(
        "INSERT INTO sync_settings (id, feed_url, seo_title_template, sync_enabled) \
         VALUES (1, $1, $2, $3) \
         ON CONFLICT (id) DO UPDATE SET \
             feed_url = EXCLUDED.feed_url, \
             seo_title_template = EXCLUDED.seo_title_template, \
             sync_enabled = EXCLUDED.sync_enabled, \
             updated_at = NOW() \
         RETURNING feed_url, seo_title_template, sync_enabled, last_sync_at, updated_at",
    )
    .bind(feed_url)
    .bind(seo_title_template)
    .bind(sync_enabled)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Stamp `last_sync_at` after a completed run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn record_last_sync(pool: &PgPool, at: DateTime<Utc>) -> Result<(), DbError> {
    sqlx::query("UPDATE sync_settings SET last_sync_at = $1, updated_at = NOW() WHERE id = 1")
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}
