//! Database operations for `sync_runs`.
//!
//! Every mutation is guarded on `status = 'started'`, so a run is finalized
//! exactly once and a finalized run never moves again.

use chrono::{DateTime, Utc};
use kdeal_core::{SyncKind, SyncRunStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const SYNC_RUN_COLUMNS: &str = "id, kind, policy, status, stage, total_products, \
     processed_products, current_batch, total_batches, products_added, products_updated, \
     products_removed, failed_batches, estimated_remaining, next_chunk_index, \
     cancel_requested, error_message, started_at, completed_at";

/// A row from the `sync_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncRunRow {
    pub id: Uuid,
    pub kind: String,
    pub policy: String,
    pub status: String,
    pub stage: String,
    pub total_products: i64,
    pub processed_products: i64,
    pub current_batch: i64,
    pub total_batches: i64,
    pub products_added: i64,
    pub products_updated: i64,
    pub products_removed: i64,
    pub failed_batches: i64,
    pub estimated_remaining: Option<String>,
    pub next_chunk_index: Option<i64>,
    pub cancel_requested: bool,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Counter snapshot written after a batch.
///
/// `processed_products` and `current_batch` never move backwards: the
/// update keeps the larger of the stored and supplied values.
#[derive(Debug, Clone, Default)]
pub struct SyncRunProgress {
    pub stage: String,
    pub total_products: i64,
    pub processed_products: i64,
    pub current_batch: i64,
    pub total_batches: i64,
    pub products_added: i64,
    pub products_updated: i64,
    pub failed_batches: i64,
    pub estimated_remaining: Option<String>,
    pub next_chunk_index: Option<i64>,
}

/// Creates a run in `started` status.
///
/// # Errors
///
/// Returns [`DbError::SyncRunInProgress`] if another run is still `started`,
/// or [`DbError::Sqlx`] if the insert fails.
pub async fn create_sync_run(
    pool: &PgPool,
    kind: SyncKind,
    policy: &str,
) -> Result<SyncRunRow, DbError> {
    let sql = format!(
        "INSERT INTO sync_runs (kind, policy, status) \
         SELECT $1, $2, 'started' \
         WHERE NOT EXISTS (SELECT 1 FROM sync_runs WHERE status = 'started') \
         RETURNING {SYNC_RUN_COLUMNS}"
    );
    let result = sqlx::query_as::<_, SyncRunRow>(&sql)
        .bind(kind.as_str())
        .bind(policy)
        .fetch_optional(pool)
        .await;

    match result {
        Ok(Some(row)) => Ok(row),
        Ok(None) => Err(DbError::SyncRunInProgress),
        // Lost a race against a concurrent insert; the partial unique index
        // on active runs rejected this one.
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(DbError::SyncRunInProgress)
        }
        Err(e) => Err(e.into()),
    }
}

/// Returns a run by id, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_sync_run(pool: &PgPool, id: Uuid) -> Result<Option<SyncRunRow>, DbError> {
    let sql = format!("SELECT {SYNC_RUN_COLUMNS} FROM sync_runs WHERE id = $1");
    let row = sqlx::query_as::<_, SyncRunRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Returns the run currently in `started` status, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_active_sync_run(pool: &PgPool) -> Result<Option<SyncRunRow>, DbError> {
    let sql = format!(
        "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs WHERE status = 'started' \
         ORDER BY started_at DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, SyncRunRow>(&sql)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Returns the most recent runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_runs(pool: &PgPool, limit: i64) -> Result<Vec<SyncRunRow>, DbError> {
    let sql = format!(
        "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs ORDER BY started_at DESC, id LIMIT $1"
    );
    let rows = sqlx::query_as::<_, SyncRunRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Writes a counter snapshot onto a `started` run.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `started`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn update_sync_run_progress(
    pool: &PgPool,
    id: Uuid,
    progress: &SyncRunProgress,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs SET \
             stage = $2, \
             total_products = $3, \
             processed_products = GREATEST(processed_products, $4), \
             current_batch = GREATEST(current_batch, $5), \
             total_batches = $6, \
             products_added = $7, \
             products_updated = $8, \
             failed_batches = GREATEST(failed_batches, $9), \
             estimated_remaining = $10, \
             next_chunk_index = $11 \
         WHERE id = $1 AND status = 'started'",
    )
    .bind(id)
    .bind(&progress.stage)
    .bind(progress.total_products)
    .bind(progress.processed_products)
    .bind(progress.current_batch)
    .bind(progress.total_batches)
    .bind(progress.products_added)
    .bind(progress.products_updated)
    .bind(progress.failed_batches)
    .bind(&progress.estimated_remaining)
    .bind(progress.next_chunk_index)
    .execute(pool)
    .await?;

    guard_started(id, result.rows_affected())
}

/// Marks a run `completed` with its reconciliation count.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `started`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn complete_sync_run(pool: &PgPool, id: Uuid, products_removed: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = 'completed', stage = $3, completed_at = NOW(), \
             products_removed = $2, estimated_remaining = NULL, next_chunk_index = NULL \
         WHERE id = $1 AND status = 'started'",
    )
    .bind(id)
    .bind(products_removed)
    .bind(SyncRunStatus::Completed.as_str())
    .execute(pool)
    .await?;

    guard_started(id, result.rows_affected())
}

/// Marks a run `failed` and keeps `error_message` verbatim.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `started`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_sync_run(pool: &PgPool, id: Uuid, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = 'failed', stage = $3, completed_at = NOW(), \
             error_message = $2, estimated_remaining = NULL \
         WHERE id = $1 AND status = 'started'",
    )
    .bind(id)
    .bind(error_message)
    .bind(SyncRunStatus::Failed.as_str())
    .execute(pool)
    .await?;

    guard_started(id, result.rows_affected())
}

/// Marks a run `cancelled`, keeping whatever counters it reached.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `started`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn cancel_sync_run(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = 'cancelled', stage = $2, completed_at = NOW(), \
             cancel_requested = TRUE, estimated_remaining = NULL \
         WHERE id = $1 AND status = 'started'",
    )
    .bind(id)
    .bind(SyncRunStatus::Cancelled.as_str())
    .execute(pool)
    .await?;

    guard_started(id, result.rows_affected())
}

/// Raise the cooperative cancel flag on a `started` run.
///
/// The run itself is finalized by whoever is driving it, at its next
/// checkpoint.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not `started`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn request_sync_run_cancel(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs SET cancel_requested = TRUE \
         WHERE id = $1 AND status = 'started'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    guard_started(id, result.rows_affected())
}

/// Whether the cancel flag is set. A missing run reads as cancelled.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn is_cancel_requested(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let flag = sqlx::query_scalar::<_, bool>("SELECT cancel_requested FROM sync_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(flag.unwrap_or(true))
}

fn guard_started(id: Uuid, rows_affected: u64) -> Result<(), DbError> {
    if rows_affected == 0 {
        return Err(DbError::InvalidSyncRunTransition {
            id,
            expected_status: "started",
        });
    }
    Ok(())
}
