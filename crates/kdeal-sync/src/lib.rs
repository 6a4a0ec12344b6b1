//! Feed-to-catalog sync pipeline.

pub mod cancel;
pub mod command;
pub mod error;
pub mod linker;
pub mod memory;
pub mod orchestrator;
pub mod pg;
pub mod policy;
pub mod progress;
pub mod source;
pub mod store;

pub use cancel::CancelToken;
pub use command::{execute_command, SyncCommand, SyncCommandResult};
pub use error::SyncError;
pub use linker::{group_key, link_variants, plan_links};
pub use memory::{MemoryStore, StoredProduct};
pub use orchestrator::{resolve_seo_title_template, BatchOutcome, SyncConfig, SyncOrchestrator};
pub use pg::PgCatalogStore;
pub use policy::SelectionPolicy;
pub use progress::{estimate_remaining, format_eta, EtaClock};
pub use source::{resolve_feed_url, FeedSource, HttpFeedSource, StaticFeed};
pub use store::{CatalogStore, RunProgress, SyncRun, VariantCandidate};
