//! In-process [`CatalogStore`] for tests and `--dry-run`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kdeal_core::{CategorySlug, NormalizedProduct, SelectionPolicyKind, SyncKind, SyncRunStatus};
use kdeal_db::{DbError, UpsertCounts};
use kdeal_feed::CategoryIndex;
use uuid::Uuid;

use crate::store::{CatalogStore, RunProgress, SyncRun, VariantCandidate};
use crate::SyncError;

/// A product as persisted by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub id: Uuid,
    pub product: NormalizedProduct,
    pub parent_product_id: Option<Uuid>,
    /// Insertion order, standing in for `created_at`.
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct Inner {
    categories: CategoryIndex,
    products: HashMap<String, StoredProduct>,
    runs: HashMap<Uuid, SyncRun>,
    next_sequence: u64,
    upsert_calls: usize,
    failing_calls: HashSet<usize>,
    cancel_after_calls: Option<usize>,
    last_sync_at: Option<DateTime<Utc>>,
}

/// Clones share one catalog.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// A store with every taxonomy slug mapped to a fresh id.
    #[must_use]
    pub fn with_taxonomy() -> Self {
        let store = Self::default();
        store.lock().categories = CategorySlug::ALL
            .into_iter()
            .map(|slug| (slug, Uuid::new_v4()))
            .collect();
        store
    }

    /// Make the `call`th upsert (1-based) fail.
    pub fn fail_upsert_call(&self, call: usize) {
        self.lock().failing_calls.insert(call);
    }

    /// Raise the cancel flag on the active run once `calls` upserts finished.
    pub fn cancel_after_upsert_calls(&self, calls: usize) {
        self.lock().cancel_after_calls = Some(calls);
    }

    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.lock().upsert_calls
    }

    #[must_use]
    pub fn product(&self, awin_product_id: &str) -> Option<StoredProduct> {
        self.lock().products.get(awin_product_id).cloned()
    }

    /// All products in insertion order.
    #[must_use]
    pub fn products(&self) -> Vec<StoredProduct> {
        let mut all: Vec<StoredProduct> = self.lock().products.values().cloned().collect();
        all.sort_by_key(|p| p.sequence);
        all
    }

    #[must_use]
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_sync_at
    }

    /// Seed a product directly, bypassing a sync.
    pub fn insert_product(&self, product: NormalizedProduct) -> Uuid {
        let mut inner = self.lock();
        let id = Uuid::new_v4();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.products.insert(
            product.awin_product_id.clone(),
            StoredProduct {
                id,
                product,
                parent_product_id: None,
                sequence,
            },
        );
        id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn started_run(inner: &mut Inner, id: Uuid) -> Result<&mut SyncRun, SyncError> {
    let run = inner.runs.get_mut(&id).ok_or(SyncError::RunNotFound(id))?;
    if run.status.is_terminal() {
        return Err(SyncError::RunFinalized(id));
    }
    Ok(run)
}

fn finalize(inner: &mut Inner, id: Uuid, status: SyncRunStatus) -> Result<&mut SyncRun, SyncError> {
    let run = started_run(inner, id)?;
    run.status = status;
    run.stage = status.as_str().to_string();
    run.completed_at = Some(Utc::now());
    run.estimated_remaining = None;
    Ok(run)
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn category_index(&self) -> Result<CategoryIndex, SyncError> {
        Ok(self.lock().categories.clone())
    }

    async fn upsert_batch(&self, products: &[NormalizedProduct]) -> Result<UpsertCounts, SyncError> {
        let mut inner = self.lock();
        inner.upsert_calls += 1;
        let call = inner.upsert_calls;

        if inner.failing_calls.contains(&call) {
            return Err(SyncError::Store(DbError::Sqlx(sqlx::Error::Protocol(format!(
                "injected failure on upsert call {call}"
            )))));
        }

        let mut counts = UpsertCounts::default();
        for product in products {
            if let Some(existing) = inner.products.get_mut(&product.awin_product_id) {
                let slug = existing.product.slug.clone();
                existing.product = product.clone();
                existing.product.slug = slug;
                counts.updated += 1;
            } else {
                let sequence = inner.next_sequence;
                inner.next_sequence += 1;
                inner.products.insert(
                    product.awin_product_id.clone(),
                    StoredProduct {
                        id: Uuid::new_v4(),
                        product: product.clone(),
                        parent_product_id: None,
                        sequence,
                    },
                );
                counts.added += 1;
            }
        }

        if inner.cancel_after_calls == Some(call) {
            for run in inner.runs.values_mut() {
                if run.status == SyncRunStatus::Started {
                    run.cancel_requested = true;
                }
            }
        }
        Ok(counts)
    }

    async fn unlinked_variants(&self) -> Result<Vec<VariantCandidate>, SyncError> {
        let inner = self.lock();
        let mut rows: Vec<&StoredProduct> = inner
            .products
            .values()
            .filter(|p| p.product.variant_value.is_some() && p.parent_product_id.is_none())
            .collect();
        rows.sort_by_key(|p| p.sequence);
        Ok(rows
            .into_iter()
            .map(|p| VariantCandidate {
                id: p.id,
                original_title: p.product.original_title.clone(),
                brand: p.product.brand.clone(),
            })
            .collect())
    }

    async fn link_variant(&self, child: Uuid, parent: Uuid) -> Result<bool, SyncError> {
        if child == parent {
            return Ok(false);
        }
        let mut inner = self.lock();
        let row = inner
            .products
            .values_mut()
            .find(|p| p.id == child && p.parent_product_id.is_none());
        Ok(row.map(|p| p.parent_product_id = Some(parent)).is_some())
    }

    async fn deactivate_missing(&self, synced_before: DateTime<Utc>) -> Result<u64, SyncError> {
        let mut inner = self.lock();
        let mut removed = 0;
        for stored in inner.products.values_mut() {
            if stored.product.is_active && stored.product.last_synced_at < synced_before {
                stored.product.is_active = false;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn create_run(
        &self,
        kind: SyncKind,
        policy: SelectionPolicyKind,
    ) -> Result<SyncRun, SyncError> {
        let mut inner = self.lock();
        if inner.runs.values().any(|r| r.status == SyncRunStatus::Started) {
            return Err(SyncError::RunInProgress);
        }
        let run = SyncRun::started(kind, policy);
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<SyncRun>, SyncError> {
        Ok(self.lock().runs.get(&id).cloned())
    }

    async fn active_run(&self) -> Result<Option<SyncRun>, SyncError> {
        Ok(self
            .lock()
            .runs
            .values()
            .find(|r| r.status == SyncRunStatus::Started)
            .cloned())
    }

    async fn update_progress(&self, id: Uuid, progress: &RunProgress) -> Result<(), SyncError> {
        let mut inner = self.lock();
        let run = started_run(&mut inner, id)?;
        run.stage.clone_from(&progress.stage);
        run.total_products = progress.total_products;
        run.processed_products = run.processed_products.max(progress.processed_products);
        run.current_batch = run.current_batch.max(progress.current_batch);
        run.total_batches = progress.total_batches;
        run.products_added = progress.products_added;
        run.products_updated = progress.products_updated;
        run.failed_batches = run.failed_batches.max(progress.failed_batches);
        run.estimated_remaining.clone_from(&progress.estimated_remaining);
        run.next_chunk_index = progress.next_chunk_index;
        Ok(())
    }

    async fn complete_run(&self, id: Uuid, products_removed: u64) -> Result<(), SyncError> {
        let mut inner = self.lock();
        let run = finalize(&mut inner, id, SyncRunStatus::Completed)?;
        run.products_removed = products_removed;
        run.next_chunk_index = None;
        Ok(())
    }

    async fn fail_run(&self, id: Uuid, error_message: &str) -> Result<(), SyncError> {
        let mut inner = self.lock();
        let run = finalize(&mut inner, id, SyncRunStatus::Failed)?;
        run.error_message = Some(error_message.to_string());
        Ok(())
    }

    async fn cancel_run(&self, id: Uuid) -> Result<(), SyncError> {
        let mut inner = self.lock();
        let run = finalize(&mut inner, id, SyncRunStatus::Cancelled)?;
        run.cancel_requested = true;
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid) -> Result<(), SyncError> {
        let mut inner = self.lock();
        started_run(&mut inner, id)?.cancel_requested = true;
        Ok(())
    }

    async fn is_cancel_requested(&self, id: Uuid) -> Result<bool, SyncError> {
        Ok(self
            .lock()
            .runs
            .get(&id)
            .is_none_or(|r| r.cancel_requested))
    }

    async fn record_last_sync(&self, at: DateTime<Utc>) -> Result<(), SyncError> {
        self.lock().last_sync_at = Some(at);
        Ok(())
    }
}
