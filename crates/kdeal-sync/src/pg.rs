use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kdeal_core::{NormalizedProduct, SelectionPolicyKind, SyncKind};
use kdeal_db::{SyncRunProgress, SyncRunRow, UpsertCounts};
use kdeal_feed::CategoryIndex;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::{CatalogStore, RunProgress, SyncRun, VariantCandidate};
use crate::SyncError;

/// [`CatalogStore`] over the `kdeal-db` queries.
#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn db_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl TryFrom<SyncRunRow> for SyncRun {
    type Error = SyncError;

    fn try_from(row: SyncRunRow) -> Result<Self, Self::Error> {
        let invalid = |field: &'static str, value: &str| SyncError::InvalidRunRecord {
            id: row.id,
            field,
            value: value.to_string(),
        };
        let kind = row.kind.parse().map_err(|_| invalid("kind", &row.kind))?;
        let policy = row
            .policy
            .parse()
            .map_err(|_| invalid("policy", &row.policy))?;
        let status = row
            .status
            .parse()
            .map_err(|_| invalid("status", &row.status))?;

        Ok(SyncRun {
            id: row.id,
            kind,
            policy,
            status,
            stage: row.stage,
            total_products: count(row.total_products),
            processed_products: count(row.processed_products),
            current_batch: count(row.current_batch),
            total_batches: count(row.total_batches),
            products_added: count(row.products_added),
            products_updated: count(row.products_updated),
            products_removed: count(row.products_removed),
            failed_batches: count(row.failed_batches),
            estimated_remaining: row.estimated_remaining,
            next_chunk_index: row.next_chunk_index.map(count),
            cancel_requested: row.cancel_requested,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

impl From<&RunProgress> for SyncRunProgress {
    fn from(p: &RunProgress) -> Self {
        Self {
            stage: p.stage.clone(),
            total_products: db_count(p.total_products),
            processed_products: db_count(p.processed_products),
            current_batch: db_count(p.current_batch),
            total_batches: db_count(p.total_batches),
            products_added: db_count(p.products_added),
            products_updated: db_count(p.products_updated),
            failed_batches: db_count(p.failed_batches),
            estimated_remaining: p.estimated_remaining.clone(),
            next_chunk_index: p.next_chunk_index.map(db_count),
        }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn category_index(&self) -> Result<CategoryIndex, SyncError> {
        let ids = kdeal_db::load_category_ids(&self.pool).await?;
        Ok(ids.into_iter().collect())
    }

    async fn upsert_batch(&self, products: &[NormalizedProduct]) -> Result<UpsertCounts, SyncError> {
        Ok(kdeal_db::upsert_products(&self.pool, products).await?)
    }

    async fn unlinked_variants(&self) -> Result<Vec<VariantCandidate>, SyncError> {
        let rows = kdeal_db::list_unlinked_variants(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| VariantCandidate {
                id: row.id,
                original_title: row.original_title,
                brand: row.brand,
            })
            .collect())
    }

    async fn link_variant(&self, child: Uuid, parent: Uuid) -> Result<bool, SyncError> {
        Ok(kdeal_db::set_parent_product(&self.pool, child, parent).await?)
    }

    async fn deactivate_missing(&self, synced_before: DateTime<Utc>) -> Result<u64, SyncError> {
        Ok(kdeal_db::deactivate_missing_products(&self.pool, synced_before).await?)
    }

    async fn create_run(
        &self,
        kind: SyncKind,
        policy: SelectionPolicyKind,
    ) -> Result<SyncRun, SyncError> {
        let row = kdeal_db::create_sync_run(&self.pool, kind, &policy.to_string())
            .await
            .map_err(SyncError::from_db)?;
        row.try_into()
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<SyncRun>, SyncError> {
        kdeal_db::get_sync_run(&self.pool, id)
            .await?
            .map(SyncRun::try_from)
            .transpose()
    }

    async fn active_run(&self) -> Result<Option<SyncRun>, SyncError> {
        kdeal_db::get_active_sync_run(&self.pool)
            .await?
            .map(SyncRun::try_from)
            .transpose()
    }

    async fn update_progress(&self, id: Uuid, progress: &RunProgress) -> Result<(), SyncError> {
        kdeal_db::update_sync_run_progress(&self.pool, id, &progress.into())
            .await
            .map_err(SyncError::from_db)
    }

    async fn complete_run(&self, id: Uuid, products_removed: u64) -> Result<(), SyncError> {
        kdeal_db::complete_sync_run(&self.pool, id, db_count(products_removed))
            .await
            .map_err(SyncError::from_db)
    }

    async fn fail_run(&self, id: Uuid, error_message: &str) -> Result<(), SyncError> {
        kdeal_db::fail_sync_run(&self.pool, id, error_message)
            .await
            .map_err(SyncError::from_db)
    }

    async fn cancel_run(&self, id: Uuid) -> Result<(), SyncError> {
        kdeal_db::cancel_sync_run(&self.pool, id)
            .await
            .map_err(SyncError::from_db)
    }

    async fn request_cancel(&self, id: Uuid) -> Result<(), SyncError> {
        kdeal_db::request_sync_run_cancel(&self.pool, id)
            .await
            .map_err(SyncError::from_db)
    }

    async fn is_cancel_requested(&self, id: Uuid) -> Result<bool, SyncError> {
        Ok(kdeal_db::is_cancel_requested(&self.pool, id).await?)
    }

    async fn record_last_sync(&self, at: DateTime<Utc>) -> Result<(), SyncError> {
        Ok(kdeal_db::record_last_sync(&self.pool, at).await?)
    }
}
