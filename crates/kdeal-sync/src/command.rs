//! Step commands for callers that drive a run across several invocations.
//!
//! Each command is one bounded unit of work. The caller loops `fetch_chunk`
//! / `upsert_batch` / `update_progress` until the chunk reports no more rows,
//! then sends `complete_run`.

use chrono::Utc;
use kdeal_core::{RawFeedRow, SelectionPolicyKind, SyncKind};
use kdeal_feed::error::FEED_CREDENTIALS_HINT;
use kdeal_feed::{FeedChunk, FeedDocument, FeedError, NormalizeContext};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::linker::link_variants;
use crate::orchestrator::{normalize_rows, reconcile_allowed, BatchOutcome, SyncOrchestrator};
use crate::source::FeedSource;
use crate::store::{CatalogStore, RunProgress, SyncRun};
use crate::SyncError;

fn default_kind() -> SyncKind {
    SyncKind::Manual
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncCommand {
    CreateRun {
        #[serde(default = "default_kind")]
        kind: SyncKind,
        /// Overrides the configured policy for this run.
        #[serde(default)]
        policy: Option<SelectionPolicyKind>,
    },
    /// Fetch the feed and return one window of it.
    FetchChunk {
        chunk_index: usize,
        #[serde(default)]
        chunk_size: Option<usize>,
    },
    /// Normalize and upsert raw rows on behalf of a started run.
    UpsertBatch { run_id: Uuid, rows: Vec<RawFeedRow> },
    UpdateProgress { run_id: Uuid, progress: RunProgress },
    CompleteRun {
        run_id: Uuid,
        #[serde(default = "default_true")]
        link_variants: bool,
    },
    CancelRun { run_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncCommandResult {
    RunCreated {
        run: SyncRun,
    },
    Chunk {
        chunk: FeedChunk,
    },
    BatchUpserted {
        added: u64,
        updated: u64,
        /// Rows the normalizer rejected.
        skipped: u64,
        failed_batches: u64,
    },
    ProgressUpdated {
        run: SyncRun,
    },
    RunCompleted {
        run: SyncRun,
        variants_linked: usize,
    },
    RunCancelled {
        run: SyncRun,
    },
}

/// Run one step command against the orchestrator's store and feed.
///
/// # Errors
///
/// Returns [`SyncError::RunNotFound`] / [`SyncError::RunFinalized`] for
/// commands addressed to a missing or finished run, and feed or store
/// errors from the step itself.
pub async fn execute_command<S, F>(
    orchestrator: &SyncOrchestrator<S, F>,
    command: SyncCommand,
) -> Result<SyncCommandResult, SyncError>
where
    S: CatalogStore,
    F: FeedSource,
{
    let store = orchestrator.store();
    let config = orchestrator.config();

    match command {
        SyncCommand::CreateRun { kind, policy } => {
            let run = store
                .create_run(kind, policy.unwrap_or(config.policy))
                .await?;
            tracing::info!(run_id = %run.id, kind = %kind, policy = %run.policy, "sync: run created");
            Ok(SyncCommandResult::RunCreated { run })
        }

        SyncCommand::FetchChunk {
            chunk_index,
            chunk_size,
        } => {
            let text = orchestrator.source().fetch_text().await?;
            let doc = FeedDocument::new(&text);
            if doc.header().is_empty() {
                return Err(FeedError::EmptyFeed {
                    lines: 0,
                    hint: FEED_CREDENTIALS_HINT,
                }
                .into());
            }
            let size = chunk_size.unwrap_or(config.chunk_size).max(1);
            Ok(SyncCommandResult::Chunk {
                chunk: FeedChunk::from_document(&doc, chunk_index, size),
            })
        }

        SyncCommand::UpsertBatch { run_id, rows } => {
            let run = require_started(store, run_id).await?;
            let categories = store.category_index().await?;
            let ctx = NormalizeContext {
                categories: &categories,
                seo_title_template: &config.seo_title_template,
                synced_at: Utc::now(),
            };
            let products = normalize_rows(run_id, &rows, &ctx);
            let skipped = rows.len() - products.len();

            let mut progress = RunProgress::default();
            for batch in products.chunks(config.batch_size.max(1)) {
                let outcome = match store.upsert_batch(batch).await {
                    Ok(counts) => BatchOutcome::Upserted(counts),
                    Err(err) => {
                        tracing::error!(run_id = %run_id, rows = batch.len(), error = %err, "sync: batch upsert failed, skipping");
                        BatchOutcome::Failed
                    }
                };
                outcome.record(&mut progress, batch.len());
            }
            if progress.failed_batches > 0 {
                // Recorded on the run so `complete_run` knows rows were skipped.
                let mut recorded = RunProgress::from_run(&run);
                recorded.failed_batches += progress.failed_batches;
                store.update_progress(run_id, &recorded).await?;
            }
            Ok(SyncCommandResult::BatchUpserted {
                added: progress.products_added,
                updated: progress.products_updated,
                skipped: u64::try_from(skipped).unwrap_or(u64::MAX),
                failed_batches: progress.failed_batches,
            })
        }

        SyncCommand::UpdateProgress { run_id, progress } => {
            store.update_progress(run_id, &progress).await?;
            Ok(SyncCommandResult::ProgressUpdated {
                run: store.require_run(run_id).await?,
            })
        }

        SyncCommand::CompleteRun {
            run_id,
            link_variants: link,
        } => {
            let run = require_started(store, run_id).await?;
            let variants_linked = if link { link_variants(store).await? } else { 0 };
            let removed = if run.policy == SelectionPolicyKind::FullPass
                && config.deactivate_missing
                && reconcile_allowed(run_id, run.processed_products, run.failed_batches)
            {
                store.deactivate_missing(run.started_at).await?
            } else {
                0
            };
            store.complete_run(run_id, removed).await?;
            store.record_last_sync(Utc::now()).await?;
            Ok(SyncCommandResult::RunCompleted {
                run: store.require_run(run_id).await?,
                variants_linked,
            })
        }

        SyncCommand::CancelRun { run_id } => {
            store.cancel_run(run_id).await?;
            tracing::info!(run_id = %run_id, "sync: run cancelled by command");
            Ok(SyncCommandResult::RunCancelled {
                run: store.require_run(run_id).await?,
            })
        }
    }
}

async fn require_started<S: CatalogStore + ?Sized>(
    store: &S,
    run_id: Uuid,
) -> Result<SyncRun, SyncError> {
    let run = store.require_run(run_id).await?;
    if run.status.is_terminal() {
        return Err(SyncError::RunFinalized(run_id));
    }
    Ok(run)
}
