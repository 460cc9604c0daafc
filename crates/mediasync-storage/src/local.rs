use crate::keys::normalize;
use crate::traits::{StorageError, StorageResult};
use bytes::Bytes;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local media directory, the on-disk copy served to clients.
#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
}

/// Holds the exclusive lock for the lifetime of a write and releases it on drop.
struct LockedFile {
    file: File,
}

impl LockedFile {
    fn acquire(file: File) -> std::io::Result<Self> {
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "Failed to release media file lock");
        }
    }
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a media-relative path to a filesystem path inside the media root.
    ///
    /// Parent-directory segments are rejected so a request can never address a
    /// file outside the root.
    pub fn key_to_path(&self, relative_path: &str) -> StorageResult<PathBuf> {
        let relative = normalize(relative_path);
        if relative.is_empty() {
            return Err(StorageError::InvalidKey("Empty media path".to_string()));
        }
        if relative.split('/').any(|segment| segment == "..") {
            return Err(StorageError::InvalidKey(format!(
                "Media path escapes the media directory: {}",
                relative_path
            )));
        }

        Ok(self.root.join(relative))
    }

    /// Path relative to the media root for an absolute path inside it or a
    /// `media/`-prefixed path. Anything else is only normalized.
    pub fn media_relative_path(&self, path: &str) -> String {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            if let Ok(rest) = candidate.strip_prefix(&self.root) {
                return normalize(&rest.to_string_lossy());
            }
        }

        let normalized = normalize(path);
        match normalized.strip_prefix("media/") {
            Some(rest) => rest.to_string(),
            None => normalized,
        }
    }

    pub async fn is_file(&self, relative_path: &str) -> bool {
        let Ok(path) = self.key_to_path(relative_path) else {
            return false;
        };
        fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Canonical absolute path, `None` when the file does not exist.
    pub async fn real_path(&self, relative_path: &str) -> Option<PathBuf> {
        let path = self.key_to_path(relative_path).ok()?;
        fs::canonicalize(path).await.ok()
    }

    /// Write `data` under an exclusive lock, replacing any previous content.
    ///
    /// The lock is released before this returns, whether the write succeeded or not.
    pub async fn write_locked(&self, relative_path: &str, data: Bytes) -> StorageResult<PathBuf> {
        let path = self.key_to_path(relative_path)?;
        let start = std::time::Instant::now();
        let size = data.len();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::LocalFileSystem {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_exclusive(&target, &data))
            .await
            .map_err(|e| StorageError::BackendError(format!("Local write task failed: {}", e)))?
            .map_err(|source| {
                tracing::error!(
                    error = %source,
                    path = %path.display(),
                    "Local media write failed"
                );
                StorageError::LocalFileSystem {
                    path: path.clone(),
                    source,
                }
            })?;

        tracing::info!(
            path = %path.display(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local media write successful"
        );

        Ok(path)
    }

    pub async fn read(&self, relative_path: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(relative_path)?;
        let data = fs::read(&path)
            .await
            .map_err(|source| StorageError::LocalFileSystem {
                path: path.clone(),
                source,
            })?;
        Ok(Bytes::from(data))
    }

    /// Open a local media file for reading, e.g. to stream it into an upload.
    pub async fn open(&self, relative_path: &str) -> StorageResult<fs::File> {
        let path = self.key_to_path(relative_path)?;
        fs::File::open(&path)
            .await
            .map_err(|source| StorageError::LocalFileSystem { path, source })
    }
}

fn write_exclusive(path: &Path, data: &[u8]) -> std::io::Result<()> {
    // Opened without truncation: the file is only emptied once the lock is held.
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    let mut locked = LockedFile::acquire(file)?;
    locked.file.set_len(0)?;
    locked.file.write_all(data)?;
    locked.file.sync_all()
}
