use thiserror::Error;

/// Appended to decode and empty-feed errors so the run record points the
/// operator at the usual cause.
pub const FEED_CREDENTIALS_HINT: &str = "check the configured feed id and API key";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by feed host (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    /// `url` is redacted to its origin; feed URLs embed the API key.
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("feed body could not be decoded ({reason}); {hint}")]
    Decode { reason: String, hint: &'static str },

    #[error("feed contained no data rows ({lines} line(s) received); {hint}")]
    EmptyFeed { lines: usize, hint: &'static str },

    /// The body had data lines but none became a product, e.g. an HTML
    /// error page or a header that does not match the rows.
    #[error("feed had {lines} data line(s) but none yielded a product; {hint}")]
    NoUsableRows { lines: usize, hint: &'static str },

    #[error("invalid feed URL: {reason}")]
    InvalidUrl { reason: String },

    #[error("normalization error for product {awin_product_id}: {reason}")]
    Normalization {
        awin_product_id: String,
        reason: String,
    },
}
