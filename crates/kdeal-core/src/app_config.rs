use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Which rows of the feed a sync run ingests.
///
/// The feed routinely holds far more rows than fit in one bounded
/// invocation, so the two sampling policies trade catalog completeness for
/// run time. See `kdeal_sync::policy` for how each one is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPolicyKind {
    /// Walk the whole feed in line windows of `sync_chunk_size`.
    #[serde(rename = "full")]
    FullPass,
    /// Keep the `sync_sample_size` rows with the largest discount.
    #[serde(rename = "top-discount")]
    TopDiscount,
    /// Keep a uniform random subset of `sync_sample_size` rows.
    #[serde(rename = "random-sample")]
    RandomSample,
}

impl std::fmt::Display for SelectionPolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicyKind::FullPass => write!(f, "full"),
            SelectionPolicyKind::TopDiscount => write!(f, "top-discount"),
            SelectionPolicyKind::RandomSample => write!(f, "random-sample"),
        }
    }
}

impl std::str::FromStr for SelectionPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SelectionPolicyKind::FullPass),
            "top-discount" => Ok(SelectionPolicyKind::TopDiscount),
            "random-sample" => Ok(SelectionPolicyKind::RandomSample),
            other => Err(format!(
                "unknown selection policy '{other}'; expected full, top-discount or random-sample"
            )),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub categories_path: PathBuf,
    pub api_keys: Vec<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Gzip CSV feed URL. When `None` the `sync_settings` row is consulted.
    pub feed_url: Option<String>,
    pub feed_request_timeout_secs: u64,
    pub feed_user_agent: String,
    pub feed_max_retries: u32,
    pub feed_retry_backoff_base_secs: u64,
    /// When `None` the `sync_settings` row, then [`crate::DEFAULT_SEO_TITLE_TEMPLATE`].
    pub seo_title_template: Option<String>,
    pub sync_policy: SelectionPolicyKind,
    pub sync_sample_size: usize,
    pub sync_batch_size: usize,
    pub sync_chunk_size: usize,
    pub sync_max_parse_rows: Option<usize>,
    pub sync_progress_every: usize,
    pub sync_deactivate_missing: bool,
    pub sync_cron: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("categories_path", &self.categories_path)
            .field("database_url", &"[redacted]")
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            // Feed URLs embed the publisher API key in their path.
            .field("feed_url", &self.feed_url.as_ref().map(|_| "[redacted]"))
            .field("feed_request_timeout_secs", &self.feed_request_timeout_secs)
            .field("feed_user_agent", &self.feed_user_agent)
            .field("feed_max_retries", &self.feed_max_retries)
            .field(
                "feed_retry_backoff_base_secs",
                &self.feed_retry_backoff_base_secs,
            )
            .field("seo_title_template", &self.seo_title_template)
            .field("sync_policy", &self.sync_policy)
            .field("sync_sample_size", &self.sync_sample_size)
            .field("sync_batch_size", &self.sync_batch_size)
            .field("sync_chunk_size", &self.sync_chunk_size)
            .field("sync_max_parse_rows", &self.sync_max_parse_rows)
            .field("sync_progress_every", &self.sync_progress_every)
            .field("sync_deactivate_missing", &self.sync_deactivate_missing)
            .field("sync_cron", &self.sync_cron)
            .finish()
    }
}
