pub mod chunk;
pub mod classify;
pub mod client;
pub mod csv;
pub mod error;
pub mod normalize;
mod rate_limit;
pub mod variant;

pub use chunk::FeedChunk;
pub use classify::classify_category;
pub use client::{FeedClient, FetchedFeed};
pub use csv::{parse_feed, parse_line, FeedDocument, ParsedFeed};
pub use error::FeedError;
pub use normalize::{normalize_row, CategoryIndex, NormalizeContext};
pub use variant::{base_title, split_variant};
