use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use kdeal_core::AppConfig;
use kdeal_sync::{
    resolve_feed_url, HttpFeedSource, PgCatalogStore, SyncConfig, SyncError, SyncOrchestrator,
};
use sqlx::PgPool;
use uuid::Uuid;

pub type PgOrchestrator = SyncOrchestrator<PgCatalogStore, HttpFeedSource>;

/// Whether building the orchestrator needs a feed URL up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedRequirement {
    /// Full runs fetch the feed, so a missing URL is rejected before a run
    /// is created.
    Required,
    /// Step commands may never touch the feed.
    Optional,
}

/// Build the Postgres-backed orchestrator for `config`.
///
/// The feed URL and the SEO title template come from the environment, then
/// the `sync_settings` row.
///
/// # Errors
///
/// Returns [`SyncError::NotConfigured`] when the URL is required and
/// missing, [`SyncError::Store`] if the settings row cannot be read, and
/// [`SyncError::Feed`] if the HTTP client cannot be built.
pub async fn build_orchestrator(
    pool: &PgPool,
    config: &AppConfig,
    feed: FeedRequirement,
) -> Result<PgOrchestrator, SyncError> {
    let settings = kdeal_db::get_sync_settings(pool).await?;
    let url = match resolve_feed_url(config.feed_url.as_deref(), settings.feed_url.as_deref()) {
        Ok(url) => Some(url),
        Err(err) if feed == FeedRequirement::Required => return Err(err),
        Err(_) => None,
    };

    let source = HttpFeedSource::from_app_config(config, url)?;
    Ok(SyncOrchestrator::new(
        PgCatalogStore::new(pool.clone()),
        source,
        SyncConfig::from_app_config(config)
            .with_settings_template(config, settings.seo_title_template.as_deref()),
    ))
}

/// Run ids with a driver task in this process.
///
/// A run is claimed before its driver is spawned and released when the
/// returned [`LiveRun`] drops. The database only says a run is `started`,
/// not whether anything is still working on it.
#[derive(Debug, Clone, Default)]
pub struct LiveRuns(Arc<Mutex<HashSet<Uuid>>>);

impl LiveRuns {
    /// `None` when `run_id` already has a driver here.
    pub fn claim(&self, run_id: Uuid) -> Option<LiveRun> {
        let fresh = self.lock().insert(run_id);
        fresh.then(|| LiveRun {
            runs: self.clone(),
            run_id,
        })
    }

    pub fn is_live(&self, run_id: Uuid) -> bool {
        self.lock().contains(&run_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        // Single insert/remove calls cannot leave the set half-written.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Claim on one run; releases it on drop.
#[derive(Debug)]
pub struct LiveRun {
    runs: LiveRuns,
    run_id: Uuid,
}

impl LiveRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for LiveRun {
    fn drop(&mut self) {
        self.runs.lock().remove(&self.run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_config;

    #[test]
    fn a_run_is_claimed_once_until_released() {
        let live = LiveRuns::default();
        let id = Uuid::new_v4();

        let claim = live.claim(id).expect("first claim");
        assert_eq!(claim.run_id(), id);
        assert!(live.is_live(id));
        assert!(live.clone().claim(id).is_none());
        assert!(live.claim(Uuid::new_v4()).is_some());

        drop(claim);
        assert!(!live.is_live(id));
        assert!(live.claim(id).is_some());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn settings_row_supplies_the_seo_template(pool: PgPool) {
        kdeal_db::update_sync_settings(&pool, None, Some("[title] | [merchant]"), true)
            .await
            .expect("settings");

        let orchestrator = build_orchestrator(&pool, &test_config(), FeedRequirement::Optional)
            .await
            .expect("orchestrator");
        assert_eq!(orchestrator.config().seo_title_template, "[title] | [merchant]");

        let mut config = test_config();
        config.seo_title_template = Some("[brand] [title]".to_string());
        let orchestrator = build_orchestrator(&pool, &config, FeedRequirement::Optional)
            .await
            .expect("orchestrator");
        assert_eq!(orchestrator.config().seo_title_template, "[brand] [title]");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn default_template_applies_without_settings(pool: PgPool) {
        let orchestrator = build_orchestrator(&pool, &test_config(), FeedRequirement::Optional)
            .await
            .expect("orchestrator");
        assert_eq!(
            orchestrator.config().seo_title_template,
            kdeal_core::DEFAULT_SEO_TITLE_TEMPLATE
        );
    }
}
