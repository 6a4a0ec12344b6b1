//! Where feed text comes from.

use async_trait::async_trait;
use kdeal_core::AppConfig;
use kdeal_feed::{FeedClient, FeedError};

use crate::SyncError;

const NO_FEED_URL: &str = "no feed URL; set KDEAL_FEED_URL or sync_settings.feed_url";

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the whole decoded feed body.
    async fn fetch_text(&self) -> Result<String, FeedError>;
}

/// The live Awin feed over HTTP.
pub struct HttpFeedSource {
    client: FeedClient,
    url: Option<String>,
}

impl HttpFeedSource {
    #[must_use]
    pub fn new(client: FeedClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: Some(url.into()),
        }
    }

    /// Build a client from `config`. Without a URL every fetch fails with
    /// [`FeedError::InvalidUrl`].
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig, url: Option<String>) -> Result<Self, FeedError> {
        let client = FeedClient::new(
            config.feed_request_timeout_secs,
            &config.feed_user_agent,
            config.feed_max_retries,
            config.feed_retry_backoff_base_secs,
        )?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_text(&self) -> Result<String, FeedError> {
        let url = self.url.as_deref().ok_or_else(|| FeedError::InvalidUrl {
            reason: NO_FEED_URL.to_string(),
        })?;
        let fetched = self.client.fetch(url).await?;
        tracing::info!(
            bytes = fetched.bytes_received,
            gzipped = fetched.was_gzipped,
            "feed downloaded"
        );
        Ok(fetched.text)
    }
}

/// A fixed body, for tests and for replaying a saved feed file.
#[derive(Debug, Clone)]
pub struct StaticFeed {
    body: Result<String, u16>,
}

impl StaticFeed {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            body: Ok(text.into()),
        }
    }

    /// A source that always answers with HTTP `status`.
    #[must_use]
    pub fn unavailable(status: u16) -> Self {
        Self { body: Err(status) }
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch_text(&self) -> Result<String, FeedError> {
        match &self.body {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(FeedError::UnexpectedStatus {
                status: *status,
                url: "static feed".to_string(),
            }),
        }
    }
}

/// The configured feed URL, falling back to the `sync_settings` row.
///
/// # Errors
///
/// Returns [`SyncError::NotConfigured`] when neither source has a URL.
pub fn resolve_feed_url(
    configured: Option<&str>,
    settings_fallback: Option<&str>,
) -> Result<String, SyncError> {
    configured
        .or(settings_fallback)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SyncError::NotConfigured(NO_FEED_URL.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_url_wins_over_settings() {
        assert_eq!(
            resolve_feed_url(Some("https://env"), Some("https://db")).unwrap(),
            "https://env"
        );
        assert_eq!(resolve_feed_url(None, Some("https://db")).unwrap(), "https://db");
    }

    #[test]
    fn missing_url_is_not_configured() {
        assert!(matches!(
            resolve_feed_url(None, Some("  ")),
            Err(SyncError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn http_source_without_url_fails_on_fetch() {
        let client = FeedClient::new(5, "test-agent", 0, 0).unwrap();
        let source = HttpFeedSource { client, url: None };
        let err = source.fetch_text().await.unwrap_err();
        assert!(matches!(err, FeedError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn unavailable_static_feed_reports_status() {
        let err = StaticFeed::unavailable(503).fetch_text().await.unwrap_err();
        assert!(matches!(err, FeedError::UnexpectedStatus { status: 503, .. }));
    }
}
