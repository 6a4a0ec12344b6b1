//! HTTP client for the Awin gzip CSV datafeed.

use std::io::Read;
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use reqwest::Client;

use crate::error::{FeedError, FEED_CREDENTIALS_HINT};
use crate::rate_limit::retry_with_backoff;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A downloaded and decoded feed body.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub text: String,
    /// Size of the body as received, before decompression.
    pub bytes_received: usize,
    /// `false` when the body was not gzip framed and was read as plain text.
    pub was_gzipped: bool,
}

/// Downloads the datafeed with `Accept-Encoding: gzip` and decompresses it
/// in-process, falling back to plain text when the body is not gzip framed.
///
/// Transient errors (429, 5xx, network failures) are retried with
/// exponential backoff up to `max_retries` additional attempts.
pub struct FeedClient {
    client: Client,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl FeedClient {
    /// Creates a `FeedClient` with configured timeout, `User-Agent`, and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_secs: u64,
    ) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            max_retries,
            backoff_base_secs,
        })
    }

    /// Fetches and decodes the feed at `feed_url`.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidUrl`] if `feed_url` does not parse.
    /// - [`FeedError::RateLimited`] / [`FeedError::UnexpectedStatus`] for
    ///   non-2xx responses after retries.
    /// - [`FeedError::Http`] for network or TLS failures after retries.
    /// - [`FeedError::Decode`] when neither gzip nor plain text yields a body.
    /// - [`FeedError::EmptyFeed`] when the body has no data rows.
    pub async fn fetch(&self, feed_url: &str) -> Result<FetchedFeed, FeedError> {
        let url = reqwest::Url::parse(feed_url).map_err(|e| FeedError::InvalidUrl {
            reason: e.to_string(),
        })?;
        let display_url = redact_url(&url);

        let body = retry_with_backoff(self.max_retries, self.backoff_base_secs, || {
            let url = url.clone();
            let display_url = display_url.clone();
            async move {
                let response = self
                    .client
                    .get(url)
                    .header(reqwest::header::ACCEPT_ENCODING, "gzip")
                    .send()
                    .await?;
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);
                    return Err(FeedError::RateLimited { retry_after_secs });
                }

                if !status.is_success() {
                    return Err(FeedError::UnexpectedStatus {
                        status: status.as_u16(),
                        url: display_url,
                    });
                }

                Ok(response.bytes().await?)
            }
        })
        .await?;

        tracing::info!(bytes = body.len(), url = %display_url, "feed downloaded");
        let feed = decode_body(&body)?;
        tracing::info!(
            chars = feed.text.len(),
            gzipped = feed.was_gzipped,
            "feed decoded"
        );
        Ok(feed)
    }
}

/// Decodes a feed body: gzip first when the magic bytes are present, then
/// plain UTF-8. A body with fewer than two non-empty lines is an error.
///
/// # Errors
///
/// Returns [`FeedError::Decode`] or [`FeedError::EmptyFeed`].
pub fn decode_body(body: &[u8]) -> Result<FetchedFeed, FeedError> {
    let mut gzip_failure = None;

    if body.starts_with(&GZIP_MAGIC) {
        let mut text = String::new();
        match MultiGzDecoder::new(body).read_to_string(&mut text) {
            Ok(_) => {
                return ensure_rows(FetchedFeed {
                    text,
                    bytes_received: body.len(),
                    was_gzipped: true,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "gzip decode failed, trying plain text");
                gzip_failure = Some(e.to_string());
            }
        }
    }

    match std::str::from_utf8(body) {
        Ok(text) => {
            if gzip_failure.is_none() {
                tracing::warn!("feed body is not gzip framed, reading as plain text");
            }
            ensure_rows(FetchedFeed {
                text: text.to_owned(),
                bytes_received: body.len(),
                was_gzipped: false,
            })
        }
        Err(utf8) => {
            let reason = match gzip_failure {
                Some(gzip) => format!("gzip: {gzip}; plain text: {utf8}"),
                None => format!("plain text: {utf8}"),
            };
            Err(FeedError::Decode {
                reason,
                hint: FEED_CREDENTIALS_HINT,
            })
        }
    }
}

fn ensure_rows(feed: FetchedFeed) -> Result<FetchedFeed, FeedError> {
    let lines = feed
        .text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(2)
        .count();
    if lines < 2 {
        return Err(FeedError::EmptyFeed {
            lines,
            hint: FEED_CREDENTIALS_HINT,
        });
    }
    Ok(feed)
}

/// Reduce a feed URL to its origin so it can be logged and stored.
fn redact_url(url: &reqwest::Url) -> String {
    format!("{}/…", url.origin().ascii_serialization())
}
