//! The persistence seam the orchestrator drives.
//!
//! [`crate::PgCatalogStore`] backs it with Postgres; [`crate::MemoryStore`]
//! keeps everything in process for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kdeal_core::{NormalizedProduct, SelectionPolicyKind, SyncKind, SyncRunStatus};
use kdeal_db::UpsertCounts;
use kdeal_feed::CategoryIndex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SyncError;

/// A sync run as the pipeline sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub kind: SyncKind,
    pub policy: SelectionPolicyKind,
    pub status: SyncRunStatus,
    /// Human-readable stage text, e.g. "upserting batch 3 of 12".
    pub stage: String,
    pub total_products: u64,
    pub processed_products: u64,
    pub current_batch: u64,
    pub total_batches: u64,
    pub products_added: u64,
    pub products_updated: u64,
    pub products_removed: u64,
    pub failed_batches: u64,
    pub estimated_remaining: Option<String>,
    /// Feed window to continue from when the run is resumed.
    pub next_chunk_index: Option<u64>,
    pub cancel_requested: bool,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    /// A fresh `started` run with zeroed counters.
    #[must_use]
    pub fn started(kind: SyncKind, policy: SelectionPolicyKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            policy,
            status: SyncRunStatus::Started,
            stage: kdeal_core::SyncStage::Idle.label(),
            total_products: 0,
            processed_products: 0,
            current_batch: 0,
            total_batches: 0,
            products_added: 0,
            products_updated: 0,
            products_removed: 0,
            failed_batches: 0,
            estimated_remaining: None,
            next_chunk_index: None,
            cancel_requested: false,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Counter snapshot persisted after a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    pub stage: String,
    pub total_products: u64,
    pub processed_products: u64,
    pub current_batch: u64,
    pub total_batches: u64,
    pub products_added: u64,
    pub products_updated: u64,
    pub failed_batches: u64,
    pub estimated_remaining: Option<String>,
    pub next_chunk_index: Option<u64>,
}

impl RunProgress {
    /// The counters already recorded on `run`, for resuming it.
    #[must_use]
    pub fn from_run(run: &SyncRun) -> Self {
        Self {
            stage: run.stage.clone(),
            total_products: run.total_products,
            processed_products: run.processed_products,
            current_batch: run.current_batch,
            total_batches: run.total_batches,
            products_added: run.products_added,
            products_updated: run.products_updated,
            failed_batches: run.failed_batches,
            estimated_remaining: run.estimated_remaining.clone(),
            next_chunk_index: run.next_chunk_index,
        }
    }
}

/// A persisted row that carries a size value and no parent yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantCandidate {
    pub id: Uuid,
    pub original_title: String,
    pub brand: Option<String>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Category slug to row id, for the normalizer.
    async fn category_index(&self) -> Result<CategoryIndex, SyncError>;

    /// Upsert one batch keyed by external product id.
    async fn upsert_batch(&self, products: &[NormalizedProduct]) -> Result<UpsertCounts, SyncError>;

    /// Rows with a size value and no parent, in store order.
    async fn unlinked_variants(&self) -> Result<Vec<VariantCandidate>, SyncError>;

    /// Point `child` at `parent`. `false` when the child was already linked.
    async fn link_variant(&self, child: Uuid, parent: Uuid) -> Result<bool, SyncError>;

    /// Deactivate active rows last synced before `synced_before`.
    async fn deactivate_missing(&self, synced_before: DateTime<Utc>) -> Result<u64, SyncError>;

    async fn create_run(
        &self,
        kind: SyncKind,
        policy: SelectionPolicyKind,
    ) -> Result<SyncRun, SyncError>;

    async fn get_run(&self, id: Uuid) -> Result<Option<SyncRun>, SyncError>;

    async fn active_run(&self) -> Result<Option<SyncRun>, SyncError>;

    async fn update_progress(&self, id: Uuid, progress: &RunProgress) -> Result<(), SyncError>;

    async fn complete_run(&self, id: Uuid, products_removed: u64) -> Result<(), SyncError>;

    async fn fail_run(&self, id: Uuid, error_message: &str) -> Result<(), SyncError>;

    async fn cancel_run(&self, id: Uuid) -> Result<(), SyncError>;

    async fn request_cancel(&self, id: Uuid) -> Result<(), SyncError>;

    async fn is_cancel_requested(&self, id: Uuid) -> Result<bool, SyncError>;

    async fn record_last_sync(&self, at: DateTime<Utc>) -> Result<(), SyncError>;

    /// Fetch a run that must exist.
    async fn require_run(&self, id: Uuid) -> Result<SyncRun, SyncError> {
        self.get_run(id).await?.ok_or(SyncError::RunNotFound(id))
    }
}
