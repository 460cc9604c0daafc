//! Remote storage abstraction
//!
//! This module defines the [`RemoteStorage`] trait implemented by the bucket
//! adapter, together with the handle, listing, and upload types it exchanges.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mediasync_core::AclPolicy;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage setup: {0}")]
    InvalidSetup(String),

    #[error("Remote read failed: {0}")]
    RemoteReadFailure(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Local filesystem error at {}: {source}", path.display())]
    LocalFileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Content handed to [`RemoteStorage::upload`].
pub enum UploadBody {
    Bytes(Bytes),
    File(tokio::fs::File),
}

impl UploadBody {
    /// Drain the body into memory. File bodies are read to EOF.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            UploadBody::Bytes(bytes) => Ok(bytes),
            UploadBody::File(mut file) => {
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

impl From<Bytes> for UploadBody {
    fn from(bytes: Bytes) -> Self {
        UploadBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadBody {
    fn from(data: Vec<u8>) -> Self {
        UploadBody::Bytes(Bytes::from(data))
    }
}

impl From<tokio::fs::File> for UploadBody {
    fn from(file: tokio::fs::File) -> Self {
        UploadBody::File(file)
    }
}

/// A bucket object as seen by the last operation that touched it.
///
/// Content is not fetched until [`ObjectHandle::content`] is called.
#[derive(Clone)]
pub struct ObjectHandle {
    key: String,
    exists: bool,
    size: u64,
    last_modified: Option<DateTime<Utc>>,
    acl_policy: Option<AclPolicy>,
    store: Arc<dyn ObjectStore>,
}

impl ObjectHandle {
    pub(crate) fn new(
        key: String,
        exists: bool,
        size: u64,
        last_modified: Option<DateTime<Utc>>,
        acl_policy: Option<AclPolicy>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            key,
            exists,
            size,
            last_modified,
            acl_policy,
            store,
        }
    }

    /// Full bucket key, prefix included.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// ACL applied at upload time, when this handle came from an upload.
    pub fn acl_policy(&self) -> Option<AclPolicy> {
        self.acl_policy
    }

    /// Fetch the object's bytes from the bucket.
    pub async fn content(&self) -> StorageResult<Bytes> {
        let location = Path::from(self.key.as_str());
        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StorageError::RemoteReadFailure(self.key.clone()),
            other => StorageError::BackendError(other.to_string()),
        })?;
        result
            .bytes()
            .await
            .map_err(|e| StorageError::RemoteReadFailure(format!("{}: {}", self.key, e)))
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("key", &self.key)
            .field("exists", &self.exists)
            .field("size", &self.size)
            .field("acl_policy", &self.acl_policy)
            .finish()
    }
}

/// Filter and paging options for [`RemoteStorage::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Media-relative prefix; the configured bucket prefix is added automatically.
    pub prefix: Option<String>,
    /// Group keys below the next separator into virtual subdirectories.
    pub delimiter: bool,
    /// Token returned by the previous page.
    pub page_token: Option<String>,
    pub max_results: Option<usize>,
}

/// One page of a bucket listing.
#[derive(Debug, Default)]
pub struct ObjectPage {
    /// Leaf objects.
    pub objects: Vec<ObjectHandle>,
    /// Virtual subdirectories (only with `delimiter`), each ending in `/`.
    pub prefixes: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Outcome of [`RemoteStorage::delete_all`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeleteAllReport {
    pub deleted: usize,
    pub failed: usize,
}

/// Remote object store abstraction.
///
/// Every method takes a media-relative path and resolves it to a bucket key
/// itself, so callers never handle the prefix. Operations are single blocking
/// round trips with no internal retry.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Resolver used to turn media-relative paths into bucket keys.
    fn resolver(&self) -> &crate::KeyResolver;

    /// ACL policy configured for uploads.
    fn acl_policy(&self) -> AclPolicy;

    /// Check if an object exists. Paths without a file extension are reported
    /// missing without asking the bucket.
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Metadata handle for an object, `None` if it does not exist.
    async fn object(&self, path: &str) -> StorageResult<Option<ObjectHandle>>;

    /// Upload content. Keys under a `tmp` directory are never uploaded and yield `None`.
    ///
    /// The ACL actually applied is the adapter's configured policy; `acl_policy`
    /// is recorded in the object's metadata and reported on the returned handle.
    async fn upload(
        &self,
        body: UploadBody,
        path: &str,
        acl_policy: AclPolicy,
    ) -> StorageResult<Option<ObjectHandle>>;

    /// Download an object's bytes; a missing object is a `RemoteReadFailure`.
    async fn download(&self, path: &str) -> StorageResult<Bytes>;

    /// Copy an object. `None` if the source does not exist.
    async fn copy(&self, source: &str, target: &str) -> StorageResult<Option<ObjectHandle>>;

    /// Move an object. `None` if the source does not exist.
    async fn rename(&self, source: &str, target: &str) -> StorageResult<Option<ObjectHandle>>;

    /// Delete an object and report whether it is confirmed absent afterwards.
    async fn delete(&self, path: &str) -> StorageResult<bool>;

    /// List one page of objects.
    async fn list(&self, options: &ListOptions) -> StorageResult<ObjectPage>;

    /// Delete every object matching `options`, continuing past individual failures.
    async fn delete_all(&self, options: &ListOptions) -> StorageResult<DeleteAllReport>;
}
