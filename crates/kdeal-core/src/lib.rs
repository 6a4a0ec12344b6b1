pub mod app_config;
pub mod categories;
pub mod config;
pub mod diversity;
pub mod products;
pub mod sync;

pub use app_config::{AppConfig, Environment, SelectionPolicyKind};
pub use categories::{load_categories, CategoriesFile, CategoryConfig, CategorySlug};
pub use config::{load_app_config, load_app_config_from_env, DEFAULT_SEO_TITLE_TEMPLATE};
pub use diversity::{diversity_shuffle, diversity_shuffle_with, DiversityKeys};
pub use products::{columns, Availability, NormalizedProduct, RawFeedRow};
pub use sync::{SyncKind, SyncRunStatus, SyncStage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read categories file {path}: {source}")]
    CategoriesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse categories file: {0}")]
    CategoriesFileParse(#[from] serde_yaml::Error),

    #[error("categories validation failed: {0}")]
    Validation(String),
}
