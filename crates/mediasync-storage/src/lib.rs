//! Mediasync Storage Library
//!
//! This crate provides the remote object store adapter and the local media store.
//!
//! # Key format
//!
//! Callers address media by its path relative to the media root. Every remote
//! operation maps that path to a bucket key through [`KeyResolver`]:
//!
//! - resized-image variant segments (`product/cache/<32 hex>/`) are removed, since
//!   the bucket only holds originals;
//! - the configured prefix, if any, is prepended exactly once;
//! - duplicate separators are collapsed.

pub mod factory;
pub mod gcs;
pub mod keys;
pub mod local;
pub mod traits;

// Re-export commonly used types
pub use factory::create_remote_storage;
pub use gcs::{GcsSettings, GcsStorage};
pub use keys::KeyResolver;
pub use local::LocalMediaStore;
pub use mediasync_core::AclPolicy;
pub use traits::{
    DeleteAllReport, ListOptions, ObjectHandle, ObjectPage, RemoteStorage, StorageError,
    StorageResult, UploadBody,
};
