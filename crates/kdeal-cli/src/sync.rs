//! Sync command handlers for the CLI.
//!
//! `run` and `resume` drive the orchestrator in this process; Ctrl-C
//! requests a cooperative stop at the next batch boundary. `--dry-run`
//! ingests into an in-memory catalog and never touches the database.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use kdeal_core::{AppConfig, SelectionPolicyKind, SyncKind};
use kdeal_db::SyncSettingsRow;
use kdeal_sync::{
    link_variants, resolve_feed_url, CancelToken, CatalogStore, FeedSource, HttpFeedSource,
    MemoryStore, PgCatalogStore, StaticFeed, SyncConfig, SyncOrchestrator, SyncRun,
};
use uuid::Uuid;

use crate::connect;

const DRY_RUN_PREVIEW_ROWS: usize = 10;

/// Sub-commands available under `sync`.
#[derive(Debug, Subcommand)]
pub enum SyncCommands {
    /// Fetch the feed and ingest it
    Run {
        /// Override KDEAL_SYNC_POLICY (full, top-discount, random-sample)
        #[arg(long)]
        policy: Option<SelectionPolicyKind>,
        /// Ingest into memory and print what would be written
        #[arg(long)]
        dry_run: bool,
        /// Read a saved feed file (gzip or plain CSV) instead of downloading
        #[arg(long)]
        feed_file: Option<PathBuf>,
    },
    /// Continue a started run from its last persisted feed window
    Resume { run_id: Uuid },
    /// Link unparented size variants to their group's first row
    LinkVariants,
    /// List recent runs
    Runs {
        #[arg(long, default_value = "10")]
        limit: i64,
        /// Print runs as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a started run to stop at its next checkpoint
    Cancel { run_id: Uuid },
}

pub(crate) async fn run_sync(config: &AppConfig, command: SyncCommands) -> anyhow::Result<()> {
    match command {
        SyncCommands::Run {
            policy,
            dry_run,
            feed_file,
        } => {
            // Dry runs stay off the database, settings row included.
            let settings = if dry_run {
                None
            } else {
                Some(load_settings(config).await?)
            };
            let sync_config = sync_config(config, settings.as_ref())
                .with_policy(policy.unwrap_or(config.sync_policy));
            match feed_file {
                Some(path) => {
                    let source = file_source(&path)?;
                    run_with_source(config, sync_config, source, dry_run).await
                }
                None => {
                    let source = http_source(config, settings.as_ref())?;
                    run_with_source(config, sync_config, source, dry_run).await
                }
            }
        }
        SyncCommands::Resume { run_id } => {
            let settings = load_settings(config).await?;
            let source = http_source(config, Some(&settings))?;
            let pool = connect(config).await?;
            let orchestrator = SyncOrchestrator::new(
                PgCatalogStore::new(pool),
                source,
                sync_config(config, Some(&settings)),
            );
            let cancel = cancel_on_ctrl_c();
            let run = orchestrator.resume(run_id, &cancel).await?;
            print_run(&run);
            Ok(())
        }
        SyncCommands::LinkVariants => {
            let store = PgCatalogStore::new(connect(config).await?);
            let linked = link_variants(&store).await?;
            println!("linked {linked} variant(s)");
            Ok(())
        }
        SyncCommands::Runs { limit, json } => run_list(config, limit, json).await,
        SyncCommands::Cancel { run_id } => {
            let store = PgCatalogStore::new(connect(config).await?);
            let run = store.require_run(run_id).await?;
            if run.status.is_terminal() {
                anyhow::bail!("run {run_id} is already {}", run.status);
            }
            store.request_cancel(run_id).await?;
            println!("cancellation requested for run {run_id}");
            Ok(())
        }
    }
}

fn file_source(path: &Path) -> anyhow::Result<StaticFeed> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("failed to read feed file {}: {e}", path.display()))?;
    let decoded = kdeal_feed::client::decode_body(&bytes)?;
    tracing::info!(
        path = %path.display(),
        bytes = bytes.len(),
        gzipped = decoded.was_gzipped,
        "feed file loaded"
    );
    Ok(StaticFeed::new(decoded.text))
}

async fn load_settings(config: &AppConfig) -> anyhow::Result<SyncSettingsRow> {
    Ok(kdeal_db::get_sync_settings(&connect(config).await?).await?)
}

fn sync_config(config: &AppConfig, settings: Option<&SyncSettingsRow>) -> SyncConfig {
    SyncConfig::from_app_config(config).with_settings_template(
        config,
        settings.and_then(|s| s.seo_title_template.as_deref()),
    )
}

/// The live feed: `KDEAL_FEED_URL`, then the `sync_settings` row when one
/// was loaded.
fn http_source(
    config: &AppConfig,
    settings: Option<&SyncSettingsRow>,
) -> anyhow::Result<HttpFeedSource> {
    let url = resolve_feed_url(
        config.feed_url.as_deref(),
        settings.and_then(|s| s.feed_url.as_deref()),
    )?;
    Ok(HttpFeedSource::from_app_config(config, Some(url))?)
}

async fn run_with_source<F: FeedSource>(
    config: &AppConfig,
    sync_config: SyncConfig,
    source: F,
    dry_run: bool,
) -> anyhow::Result<()> {
    let cancel = cancel_on_ctrl_c();

    if dry_run {
        let store = MemoryStore::with_taxonomy();
        let orchestrator = SyncOrchestrator::new(store.clone(), source, sync_config);
        let run = orchestrator.run(SyncKind::Manual, &cancel).await?;
        print_run(&run);
        print_dry_run_preview(&store);
        return Ok(());
    }

    let pool = connect(config).await?;
    let orchestrator = SyncOrchestrator::new(PgCatalogStore::new(pool), source, sync_config);
    let run = orchestrator.run(SyncKind::Manual, &cancel).await?;
    print_run(&run);
    Ok(())
}

fn print_dry_run_preview(store: &MemoryStore) {
    let products = store.products();
    let linked = products
        .iter()
        .filter(|p| p.parent_product_id.is_some())
        .count();
    println!(
        "dry-run: {} products would be written ({linked} linked as variants)",
        products.len()
    );
    for stored in products.iter().take(DRY_RUN_PREVIEW_ROWS) {
        let p = &stored.product;
        println!(
            "  {:<14} {:<18} {:>4}%  {}",
            p.awin_product_id,
            p.category_slug.as_str(),
            p.discount_or_zero(),
            p.seo_title
        );
    }
}

/// A token that trips on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current batch");
            trip.cancel();
        }
    });
    cancel
}

async fn run_list(config: &AppConfig, limit: i64, json: bool) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    let runs = kdeal_db::list_sync_runs(&pool, limit.clamp(1, 200))
        .await?
        .into_iter()
        .map(SyncRun::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("no sync runs recorded");
        return Ok(());
    }
    println!(
        "{:<36}  {:<9}  {:<13}  {:<9}  {:>9}  {:>7}  {:>7}  started",
        "id", "kind", "policy", "status", "processed", "added", "updated"
    );
    for run in &runs {
        println!(
            "{:<36}  {:<9}  {:<13}  {:<9}  {:>9}  {:>7}  {:>7}  {}",
            run.id.to_string(),
            run.kind.as_str(),
            run.policy.to_string(),
            run.status.as_str(),
            run.processed_products,
            run.products_added,
            run.products_updated,
            run.started_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn print_run(run: &SyncRun) {
    println!("run {} {}", run.id, run.status);
    println!("  policy:     {}", run.policy);
    println!("  stage:      {}", run.stage);
    println!(
        "  processed:  {} of {} ({} batches, {} failed)",
        run.processed_products, run.total_products, run.total_batches, run.failed_batches
    );
    println!(
        "  products:   {} added, {} updated, {} deactivated",
        run.products_added, run.products_updated, run.products_removed
    );
    if let Some(message) = &run.error_message {
        println!("  error:      {message}");
    }
}
