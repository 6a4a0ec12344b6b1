use kdeal_db::DbError;
use kdeal_feed::FeedError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("store error: {0}")]
    Store(#[from] DbError),

    #[error("sync is not configured: {0}")]
    NotConfigured(String),

    #[error("sync run {0} not found")]
    RunNotFound(Uuid),

    #[error("sync run {0} is already finalized")]
    RunFinalized(Uuid),

    #[error("another sync run is already in progress")]
    RunInProgress,

    #[error("sync run {id} has an unreadable {field}: {value}")]
    InvalidRunRecord {
        id: Uuid,
        field: &'static str,
        value: String,
    },
}

impl SyncError {
    /// Lift store errors that carry sync semantics into their own variants.
    #[must_use]
    pub fn from_db(error: DbError) -> Self {
        match error {
            DbError::SyncRunInProgress => SyncError::RunInProgress,
            DbError::InvalidSyncRunTransition { id, .. } => SyncError::RunFinalized(id),
            other => SyncError::Store(other),
        }
    }
}
