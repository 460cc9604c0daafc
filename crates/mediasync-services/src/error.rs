use mediasync_infra::{CacheError, FetchError};
use mediasync_storage::StorageError;
use mediasync_worker::QueueError;
use thiserror::Error;

/// Synchronization service errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Unable to save file: {0}")]
    NotPersisted(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
