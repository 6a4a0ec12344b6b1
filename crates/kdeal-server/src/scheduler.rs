//! Background job scheduler.
//!
//! When `KDEAL_SYNC_CRON` is set, registers a job that runs a `scheduled`
//! sync with the configured policy.

use std::sync::Arc;

use kdeal_core::{AppConfig, SyncKind};
use kdeal_sync::{CancelToken, CatalogStore, SyncError, SyncRun};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::pipeline::{build_orchestrator, FeedRequirement, LiveRuns};

/// What one firing of the sync job did.
#[derive(Debug)]
pub(crate) enum ScheduledSync {
    Skipped(&'static str),
    Finished(SyncRun),
    Aborted(SyncError),
}

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is rejected, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<AppConfig>,
    live_runs: LiveRuns,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    match config.sync_cron.clone() {
        Some(cron) => register_sync_job(&scheduler, &cron, pool, config, live_runs).await?,
        None => tracing::info!("scheduler: KDEAL_SYNC_CRON not set; scheduled sync disabled"),
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_sync_job(
    scheduler: &JobScheduler,
    cron: &str,
    pool: PgPool,
    config: Arc<AppConfig>,
    live_runs: LiveRuns,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let config = Arc::clone(&config);
        let live_runs = live_runs.clone();

        Box::pin(async move {
            tracing::info!("scheduler: starting scheduled sync");
            match run_scheduled_sync(&pool, &config, &live_runs).await {
                ScheduledSync::Skipped(reason) => {
                    tracing::info!(reason, "scheduler: scheduled sync skipped");
                }
                ScheduledSync::Finished(run) => tracing::info!(
                    run_id = %run.id,
                    status = %run.status,
                    processed = run.processed_products,
                    failed_batches = run.failed_batches,
                    "scheduler: scheduled sync finished"
                ),
                ScheduledSync::Aborted(e) => {
                    tracing::error!(error = %e, "scheduler: scheduled sync aborted");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: sync job registered");
    Ok(())
}

pub(crate) async fn run_scheduled_sync(
    pool: &PgPool,
    config: &AppConfig,
    live_runs: &LiveRuns,
) -> ScheduledSync {
    match kdeal_db::get_sync_settings(pool).await {
        Ok(settings) if !settings.sync_enabled => return ScheduledSync::Skipped("sync disabled"),
        Ok(_) => {}
        Err(e) => return ScheduledSync::Aborted(e.into()),
    }
    match kdeal_db::get_active_sync_run(pool).await {
        Ok(Some(_)) => return ScheduledSync::Skipped("a run is already in progress"),
        Ok(None) => {}
        Err(e) => return ScheduledSync::Aborted(e.into()),
    }

    let orchestrator = match build_orchestrator(pool, config, FeedRequirement::Required).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => return ScheduledSync::Aborted(e),
    };
    let run = match orchestrator
        .store()
        .create_run(SyncKind::Scheduled, orchestrator.config().policy)
        .await
    {
        Ok(run) => run,
        // Lost the race to a manual run started after the check above.
        Err(SyncError::RunInProgress) => {
            return ScheduledSync::Skipped("a run is already in progress")
        }
        Err(e) => return ScheduledSync::Aborted(e),
    };
    let Some(_live) = live_runs.claim(run.id) else {
        return ScheduledSync::Skipped("a run is already in progress");
    };
    match orchestrator.resume(run.id, &CancelToken::new()).await {
        Ok(run) => ScheduledSync::Finished(run),
        Err(e) => ScheduledSync::Aborted(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{seeded_state, test_config};
    use kdeal_core::SyncRunStatus;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[sqlx::test(migrations = "../../migrations")]
    async fn disabled_settings_skip_the_job(pool: PgPool) {
        kdeal_db::update_sync_settings(&pool, None, None, false)
            .await
            .expect("settings");

        let outcome = run_scheduled_sync(&pool, &test_config(), &LiveRuns::default()).await;
        assert!(matches!(outcome, ScheduledSync::Skipped("sync disabled")));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn an_active_run_skips_the_job(pool: PgPool) {
        kdeal_db::create_sync_run(&pool, SyncKind::Manual, "full")
            .await
            .expect("create run");

        let outcome = run_scheduled_sync(&pool, &test_config(), &LiveRuns::default()).await;
        assert!(matches!(outcome, ScheduledSync::Skipped(_)));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn missing_feed_url_aborts_without_a_run(pool: PgPool) {
        let outcome = run_scheduled_sync(&pool, &test_config(), &LiveRuns::default()).await;
        assert!(matches!(
            outcome,
            ScheduledSync::Aborted(SyncError::NotConfigured(_))
        ));
        assert!(kdeal_db::list_sync_runs(&pool, 5)
            .await
            .expect("runs")
            .is_empty());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn scheduled_run_is_recorded_as_scheduled(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "aw_product_id,product_name,search_price,rrp_price\nQ1,Tuinset,80.00,100.00\n",
            ))
            .mount(&server)
            .await;
        let state = seeded_state(pool).await;
        let mut config = test_config();
        config.feed_url = Some(server.uri());

        let outcome = run_scheduled_sync(&state.pool, &config, &state.live_runs).await;

        let ScheduledSync::Finished(run) = outcome else {
            panic!("expected a finished run, got {outcome:?}");
        };
        assert_eq!(run.kind, SyncKind::Scheduled);
        assert_eq!(run.status, SyncRunStatus::Completed);
        assert_eq!(run.products_added, 1);
        assert!(!state.live_runs.is_live(run.id));
    }
}
