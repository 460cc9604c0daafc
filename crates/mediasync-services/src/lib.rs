//! Mediasync Services Layer
//!
//! This crate hosts the synchronization orchestrator, which decides how a media
//! request is satisfied (local copy, bucket, fallback origin, or background fetch),
//! and the media bucket service used for bulk export, import, and directory browsing.

pub mod bucket;
pub mod error;
pub mod orchestrator;

pub use bucket::{ExportPage, ImportFile, MediaBucket, MediaFile, UploadedFile};
pub use error::SyncError;
pub use orchestrator::{Resolution, SyncComponents, SyncOrchestrator};

pub use mediasync_infra::{FetchSource, LookupCache, OriginFetcher};
pub use mediasync_storage::{create_remote_storage, LocalMediaStore, RemoteStorage, StorageError};
pub use mediasync_worker::{FetchDispatcher, FetchJob, FetchQueue, FetchQueueConfig};
