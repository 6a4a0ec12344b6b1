//! The batch sync state machine.
//!
//! `idle -> fetching -> parsing -> upserting(i of N) -> linking -> completed`,
//! with `failed` and `cancelled` as the other terminal states. Progress is
//! persisted on the run record so a resumed invocation can pick up at the
//! next feed window.

use chrono::Utc;
use kdeal_core::{
    AppConfig, CategorySlug, NormalizedProduct, RawFeedRow, SelectionPolicyKind, SyncKind,
    SyncStage, DEFAULT_SEO_TITLE_TEMPLATE,
};
use kdeal_db::UpsertCounts;
use kdeal_feed::error::FEED_CREDENTIALS_HINT;
use kdeal_feed::{normalize_row, FeedChunk, FeedDocument, FeedError, NormalizeContext};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::linker::link_variants;
use crate::policy::SelectionPolicy;
use crate::progress::{should_persist, EtaClock};
use crate::source::FeedSource;
use crate::store::{CatalogStore, RunProgress, SyncRun};
use crate::SyncError;

/// Pipeline settings, fixed for the lifetime of an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub policy: SelectionPolicyKind,
    pub sample_size: usize,
    pub batch_size: usize,
    pub chunk_size: usize,
    /// Row bound for the sampling policies. A full pass is bounded by
    /// `chunk_size` per window instead.
    pub max_parse_rows: Option<usize>,
    pub progress_every: usize,
    pub deactivate_missing: bool,
    pub seo_title_template: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicyKind::FullPass,
            sample_size: 5000,
            batch_size: 100,
            chunk_size: 5000,
            max_parse_rows: None,
            progress_every: 1,
            deactivate_missing: true,
            seo_title_template: DEFAULT_SEO_TITLE_TEMPLATE.to_string(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            policy: config.sync_policy,
            sample_size: config.sync_sample_size,
            batch_size: config.sync_batch_size.max(1),
            chunk_size: config.sync_chunk_size.max(1),
            max_parse_rows: config.sync_max_parse_rows,
            progress_every: config.sync_progress_every.max(1),
            deactivate_missing: config.sync_deactivate_missing,
            seo_title_template: resolve_seo_title_template(config.seo_title_template.as_deref(), None),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SelectionPolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Apply the `sync_settings` template unless the environment set one.
    #[must_use]
    pub fn with_settings_template(mut self, config: &AppConfig, settings: Option<&str>) -> Self {
        self.seo_title_template =
            resolve_seo_title_template(config.seo_title_template.as_deref(), settings);
        self
    }

    fn selection(&self, kind: SelectionPolicyKind) -> SelectionPolicy {
        SelectionPolicy::new(kind, self.chunk_size, self.sample_size)
    }
}

/// The SEO title template: the environment, then the settings row, then the
/// built-in default. Blank values count as unset.
#[must_use]
pub fn resolve_seo_title_template(configured: Option<&str>, settings: Option<&str>) -> String {
    configured
        .into_iter()
        .chain(settings)
        .map(str::trim)
        .find(|t| !t.is_empty())
        .unwrap_or(DEFAULT_SEO_TITLE_TEMPLATE)
        .to_string()
}

/// What became of one batch upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Upserted(UpsertCounts),
    /// The store rejected the batch; it is skipped and counted.
    Failed,
}

impl BatchOutcome {
    /// Fold this batch into the run counters.
    pub fn record(self, progress: &mut RunProgress, rows: usize) {
        progress.current_batch += 1;
        progress.processed_products += to_u64(rows);
        match self {
            BatchOutcome::Upserted(counts) => {
                progress.products_added += counts.added;
                progress.products_updated += counts.updated;
            }
            BatchOutcome::Failed => progress.failed_batches += 1,
        }
    }
}

enum Flow {
    Continue,
    Cancelled,
}

enum RunEnd {
    Completed { removed: u64 },
    Cancelled,
}

pub struct SyncOrchestrator<S, F> {
    store: S,
    source: F,
    config: SyncConfig,
}

impl<S: CatalogStore, F: FeedSource> SyncOrchestrator<S, F> {
    pub fn new(store: S, source: F, config: SyncConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &F {
        &self.source
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Create a run and drive it to a terminal state.
    ///
    /// A feed that cannot be fetched or decoded is not an error here: the
    /// run comes back `failed` with the message attached.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RunInProgress`] when another run is active, and
    /// store errors that prevented the run from being recorded.
    pub async fn run(&self, kind: SyncKind, cancel: &CancelToken) -> Result<SyncRun, SyncError> {
        let run = self.store.create_run(kind, self.config.policy).await?;
        tracing::info!(
            run_id = %run.id,
            kind = %kind,
            policy = %run.policy,
            batch_size = self.config.batch_size,
            "sync: run started"
        );
        self.drive(run, 0, cancel).await
    }

    /// Continue a `started` run from its persisted feed window and counters.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RunNotFound`] or [`SyncError::RunFinalized`] when
    /// there is nothing to resume, otherwise as [`Self::run`].
    pub async fn resume(&self, run_id: Uuid, cancel: &CancelToken) -> Result<SyncRun, SyncError> {
        let run = self.store.require_run(run_id).await?;
        if run.status.is_terminal() {
            return Err(SyncError::RunFinalized(run_id));
        }
        let start_chunk = run.next_chunk_index.map_or(0, as_usize);
        tracing::info!(
            run_id = %run.id,
            start_chunk,
            processed = run.processed_products,
            "sync: resuming run"
        );
        self.drive(run, start_chunk, cancel).await
    }

    async fn drive(
        &self,
        run: SyncRun,
        start_chunk: usize,
        cancel: &CancelToken,
    ) -> Result<SyncRun, SyncError> {
        let id = run.id;
        let mut progress = RunProgress::from_run(&run);

        let finalized = match self.execute(&run, &mut progress, start_chunk, cancel).await {
            Ok(RunEnd::Completed { removed }) => {
                let finished = self.store.complete_run(id, removed).await;
                if finished.is_ok() {
                    self.store.record_last_sync(Utc::now()).await?;
                    tracing::info!(
                        run_id = %id,
                        processed = progress.processed_products,
                        added = progress.products_added,
                        updated = progress.products_updated,
                        removed,
                        failed_batches = progress.failed_batches,
                        "sync: run completed"
                    );
                }
                finished
            }
            Ok(RunEnd::Cancelled) => {
                tracing::info!(
                    run_id = %id,
                    processed = progress.processed_products,
                    "sync: run cancelled"
                );
                self.store.cancel_run(id).await
            }
            Err(err @ (SyncError::Feed(_) | SyncError::NotConfigured(_))) => {
                tracing::error!(run_id = %id, error = %err, "sync: run failed");
                self.store.fail_run(id, &err.to_string()).await
            }
            Err(SyncError::RunFinalized(_)) => Err(SyncError::RunFinalized(id)),
            Err(err) => {
                tracing::error!(run_id = %id, error = %err, "sync: run aborted by store error");
                if let Err(mark) = self.store.fail_run(id, &err.to_string()).await {
                    tracing::warn!(run_id = %id, error = %mark, "sync: could not mark run failed");
                }
                return Err(err);
            }
        };

        match finalized {
            // Another caller finalized the run first; report what it recorded.
            Ok(()) | Err(SyncError::RunFinalized(_)) => self.store.require_run(id).await,
            Err(err) => Err(err),
        }
    }

    async fn execute(
        &self,
        run: &SyncRun,
        progress: &mut RunProgress,
        start_chunk: usize,
        cancel: &CancelToken,
    ) -> Result<RunEnd, SyncError> {
        let id = run.id;
        let policy = self.config.selection(run.policy);

        self.set_stage(id, progress, SyncStage::Fetching { chunk: start_chunk })
            .await?;
        if self.cancel_requested(id, cancel).await? {
            return Ok(RunEnd::Cancelled);
        }
        let text = self.source.fetch_text().await?;

        self.set_stage(id, progress, SyncStage::Parsing).await?;
        let doc = FeedDocument::new(&text);
        if doc.header().is_empty() || doc.data_line_count() == 0 {
            return Err(FeedError::EmptyFeed {
                lines: usize::from(!doc.header().is_empty()),
                hint: FEED_CREDENTIALS_HINT,
            }
            .into());
        }

        let categories = self.store.category_index().await?;
        if categories.resolve(CategorySlug::FALLBACK).is_none() {
            return Err(SyncError::NotConfigured(format!(
                "category '{}' is not seeded; run `kdeal db seed`",
                CategorySlug::FALLBACK
            )));
        }
        let ctx = NormalizeContext {
            categories: &categories,
            seo_title_template: &self.config.seo_title_template,
            synced_at: Utc::now(),
        };
        let clock = EtaClock::start(progress.processed_products);

        let flow = match policy {
            SelectionPolicy::FullPass { chunk_size } => {
                self.full_pass(id, &doc, chunk_size, start_chunk, &ctx, progress, &clock, cancel)
                    .await?
            }
            SelectionPolicy::TopDiscount { .. } | SelectionPolicy::RandomSample { .. } => {
                self.sampled(id, &doc, policy, &ctx, progress, &clock, cancel)
                    .await?
            }
        };
        if matches!(flow, Flow::Cancelled) || self.cancel_requested(id, cancel).await? {
            return Ok(RunEnd::Cancelled);
        }
        if progress.processed_products == 0 {
            return Err(FeedError::NoUsableRows {
                lines: doc.data_line_count(),
                hint: FEED_CREDENTIALS_HINT,
            }
            .into());
        }

        self.set_stage(id, progress, SyncStage::Linking).await?;
        link_variants(&self.store).await?;

        let removed = if policy.sees_whole_feed()
            && self.config.deactivate_missing
            && reconcile_allowed(id, progress.processed_products, progress.failed_batches)
        {
            self.set_stage(id, progress, SyncStage::Reconciling).await?;
            let removed = self.store.deactivate_missing(run.started_at).await?;
            tracing::info!(run_id = %id, removed, "sync: deactivated products missing from feed");
            removed
        } else {
            0
        };
        Ok(RunEnd::Completed { removed })
    }

    #[allow(clippy::too_many_arguments)]
    async fn full_pass(
        &self,
        id: Uuid,
        doc: &FeedDocument<'_>,
        chunk_size: usize,
        start_chunk: usize,
        ctx: &NormalizeContext<'_>,
        progress: &mut RunProgress,
        clock: &EtaClock,
        cancel: &CancelToken,
    ) -> Result<Flow, SyncError> {
        let total_lines = doc.data_line_count();
        progress.total_products = to_u64(doc.identified_row_count());
        progress.total_batches = to_u64(planned_batches(
            total_lines,
            chunk_size,
            self.config.batch_size,
        ));

        let mut chunk_index = start_chunk;
        loop {
            if self.cancel_requested(id, cancel).await? {
                return Ok(Flow::Cancelled);
            }
            let chunk = FeedChunk::from_document(doc, chunk_index, chunk_size);
            let products = normalize_rows(id, &chunk.rows, ctx);
            let dropped = chunk.rows.len().saturating_sub(products.len());
            progress.total_products = progress.total_products.saturating_sub(to_u64(dropped));

            if let Flow::Cancelled = self
                .upsert_in_batches(id, &products, progress, clock, cancel)
                .await?
            {
                return Ok(Flow::Cancelled);
            }

            progress.next_chunk_index = chunk.next_chunk_index.map(to_u64);
            self.store.update_progress(id, progress).await?;

            match chunk.next_chunk_index {
                Some(next) => chunk_index = next,
                None => return Ok(Flow::Continue),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn sampled(
        &self,
        id: Uuid,
        doc: &FeedDocument<'_>,
        policy: SelectionPolicy,
        ctx: &NormalizeContext<'_>,
        progress: &mut RunProgress,
        clock: &EtaClock,
        cancel: &CancelToken,
    ) -> Result<Flow, SyncError> {
        let mut parsed = doc.rows(self.config.max_parse_rows);
        let unidentified = parsed.retain_identified();
        tracing::info!(
            run_id = %id,
            lines_scanned = parsed.lines_scanned,
            rows = parsed.rows.len(),
            skipped = parsed.skipped_rows,
            unidentified,
            "sync: feed parsed"
        );

        let normalized = normalize_rows(id, &parsed.rows, ctx);
        let selected = {
            let mut rng = rand::rng();
            policy.select(normalized, &mut rng)
        };
        tracing::info!(run_id = %id, policy = %policy.kind(), selected = selected.len(), "sync: rows selected");

        progress.total_products = to_u64(selected.len());
        progress.total_batches = to_u64(selected.len().div_ceil(self.config.batch_size.max(1)));
        progress.next_chunk_index = None;
        self.upsert_in_batches(id, &selected, progress, clock, cancel)
            .await
    }

    async fn upsert_in_batches(
        &self,
        id: Uuid,
        products: &[NormalizedProduct],
        progress: &mut RunProgress,
        clock: &EtaClock,
        cancel: &CancelToken,
    ) -> Result<Flow, SyncError> {
        for batch in products.chunks(self.config.batch_size.max(1)) {
            if self.cancel_requested(id, cancel).await? {
                return Ok(Flow::Cancelled);
            }
            let number = progress.current_batch + 1;

            let outcome = match self.store.upsert_batch(batch).await {
                Ok(counts) => BatchOutcome::Upserted(counts),
                Err(err) => {
                    tracing::error!(
                        run_id = %id,
                        batch = number,
                        rows = batch.len(),
                        error = %err,
                        "sync: batch upsert failed, skipping"
                    );
                    BatchOutcome::Failed
                }
            };
            outcome.record(progress, batch.len());
            progress.total_batches = progress.total_batches.max(number);
            progress.stage = SyncStage::Upserting {
                batch: as_usize(number),
                total_batches: as_usize(progress.total_batches),
            }
            .label();
            progress.estimated_remaining =
                clock.estimate(progress.total_products, progress.processed_products);

            tracing::info!(
                run_id = %id,
                batch = number,
                total_batches = progress.total_batches,
                processed = progress.processed_products,
                "sync: batch upserted"
            );
            if should_persist(
                number,
                progress.total_batches,
                to_u64(self.config.progress_every),
            ) {
                self.store.update_progress(id, progress).await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn set_stage(
        &self,
        id: Uuid,
        progress: &mut RunProgress,
        stage: SyncStage,
    ) -> Result<(), SyncError> {
        tracing::debug!(run_id = %id, stage = %stage, "sync: stage");
        progress.stage = stage.label();
        self.store.update_progress(id, progress).await
    }

    /// Cancellation checkpoint: the caller's token or the persisted flag.
    async fn cancel_requested(&self, id: Uuid, cancel: &CancelToken) -> Result<bool, SyncError> {
        if cancel.is_cancelled() {
            return Ok(true);
        }
        self.store.is_cancel_requested(id).await
    }
}

/// Normalize `rows`, dropping the ones that fail and logging the count.
pub fn normalize_rows(
    run_id: Uuid,
    rows: &[RawFeedRow],
    ctx: &NormalizeContext<'_>,
) -> Vec<NormalizedProduct> {
    let mut products = Vec::with_capacity(rows.len());
    let mut failed = 0usize;
    for row in rows {
        match normalize_row(row, ctx) {
            Ok(product) => products.push(product),
            Err(err) => {
                failed += 1;
                tracing::debug!(run_id = %run_id, error = %err, "sync: row not normalized");
            }
        }
    }
    if failed > 0 {
        tracing::warn!(run_id = %run_id, failed, kept = products.len(), "sync: rows dropped by normalizer");
    }
    products
}

/// Deactivating rows the run did not touch is only safe when rows arrived
/// and every batch landed; a skipped batch leaves live feed rows with a
/// stale sync time.
pub(crate) fn reconcile_allowed(run_id: Uuid, processed: u64, failed_batches: u64) -> bool {
    if processed == 0 {
        tracing::warn!(run_id = %run_id, "sync: skipping deactivation, no rows processed");
        return false;
    }
    if failed_batches > 0 {
        tracing::warn!(
            run_id = %run_id,
            failed_batches,
            "sync: skipping deactivation after failed batches"
        );
        return false;
    }
    true
}

/// Batches a full pass will need if no line is skipped.
fn planned_batches(total_lines: usize, chunk_size: usize, batch_size: usize) -> usize {
    let chunk_size = chunk_size.max(1);
    let batch_size = batch_size.max(1);
    let full_chunks = total_lines / chunk_size;
    let tail = total_lines % chunk_size;
    full_chunks * chunk_size.div_ceil(batch_size) + tail.div_ceil(batch_size)
}

fn to_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

fn as_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planned_batches_follow_chunk_boundaries() {
        assert_eq!(planned_batches(500, 5000, 100), 5);
        assert_eq!(planned_batches(250, 100, 100), 3);
        // Windows of 150 lines split into 100 + 50.
        assert_eq!(planned_batches(300, 150, 100), 4);
        assert_eq!(planned_batches(0, 100, 100), 0);
    }

    #[test]
    fn failed_batch_counts_rows_but_not_inserts() {
        let mut progress = RunProgress::default();
        BatchOutcome::Upserted(UpsertCounts {
            added: 80,
            updated: 20,
        })
        .record(&mut progress, 100);
        BatchOutcome::Failed.record(&mut progress, 100);
        assert_eq!(progress.current_batch, 2);
        assert_eq!(progress.processed_products, 200);
        assert_eq!(progress.products_added, 80);
        assert_eq!(progress.failed_batches, 1);
    }

    #[test]
    fn seo_template_prefers_environment_then_settings() {
        assert_eq!(
            resolve_seo_title_template(Some("[title] env"), Some("[title] db")),
            "[title] env"
        );
        assert_eq!(
            resolve_seo_title_template(None, Some("[title] db")),
            "[title] db"
        );
        assert_eq!(
            resolve_seo_title_template(Some(" "), None),
            DEFAULT_SEO_TITLE_TEMPLATE
        );
    }

    #[test]
    fn reconciliation_needs_every_batch_to_land() {
        assert!(reconcile_allowed(Uuid::new_v4(), 250, 0));
        assert!(!reconcile_allowed(Uuid::new_v4(), 250, 1));
        assert!(!reconcile_allowed(Uuid::new_v4(), 0, 0));
    }

    #[test]
    fn selection_follows_the_run_policy() {
        let config = SyncConfig::default().with_policy(SelectionPolicyKind::TopDiscount);
        assert_eq!(config.policy, SelectionPolicyKind::TopDiscount);
        assert_eq!(
            config.selection(SelectionPolicyKind::FullPass),
            SelectionPolicy::FullPass { chunk_size: 5000 }
        );
        assert_eq!(
            config.selection(SelectionPolicyKind::TopDiscount),
            SelectionPolicy::TopDiscount { limit: 5000 }
        );
    }
}
