//! Media bucket service
//!
//! Bulk transfer between the media directory and the bucket, plus directory
//! browsing emulated through delimiter listings.

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

use mediasync_storage::{ListOptions, LocalMediaStore, RemoteStorage, UploadBody};

use crate::error::{SyncError, SyncResult};

/// A named file and its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Media-relative path.
    pub filename: String,
    pub content: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct ExportPage {
    pub files: Vec<MediaFile>,
    /// Token for the next page, `None` once the listing is exhausted.
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImportFile {
    pub filename: String,
    pub directory: Option<String>,
    pub content: Bytes,
}

/// File saved by the host's upload handler.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Destination directory.
    pub path: String,
    /// File name inside `path`.
    pub file: String,
}

pub struct MediaBucket {
    remote: Arc<dyn RemoteStorage>,
    local: LocalMediaStore,
}

impl MediaBucket {
    pub fn new(remote: Arc<dyn RemoteStorage>, local: LocalMediaStore) -> Self {
        Self { remote, local }
    }

    /// Join a directory and a file name with a single separator.
    pub fn file_path(path: &str, prefix: Option<&str>) -> String {
        match prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => format!(
                "{}/{}",
                prefix.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }

    /// Download one page of bucket objects.
    pub async fn export_files(
        &self,
        page_token: Option<String>,
        count: usize,
    ) -> SyncResult<ExportPage> {
        let page = self
            .remote
            .list(&ListOptions {
                page_token,
                max_results: Some(count.max(1)),
                ..Default::default()
            })
            .await?;

        let mut files = Vec::with_capacity(page.objects.len());
        for object in &page.objects {
            let key = object.key();
            if key.is_empty() || key.starts_with('/') || key.ends_with('/') {
                continue;
            }

            files.push(MediaFile {
                filename: self.remote.resolver().strip_prefix(key),
                content: object.content().await?,
            });
        }

        tracing::info!(
            exported = files.len(),
            has_more = page.next_page_token.is_some(),
            "Exported bucket page"
        );

        Ok(ExportPage {
            files,
            next_page_token: page.next_page_token,
        })
    }

    /// Upload files and confirm each one landed. Failures are collected and
    /// returned as messages; the remaining files are still imported.
    pub async fn import_files(&self, files: Vec<ImportFile>) -> Vec<String> {
        let mut errors = Vec::new();

        for file in files {
            let file_path = Self::file_path(&file.filename, file.directory.as_deref());
            let relative_path = self.local.media_relative_path(&file_path);

            if let Err(e) = self
                .upload_verified(UploadBody::Bytes(file.content), &relative_path)
                .await
            {
                tracing::error!(error = %e, path = %file_path, "Import failed");
                errors.push(e.to_string());
            }
        }

        errors
    }

    /// Upload a file from the media directory and confirm it landed.
    pub async fn save_file(&self, filename: &str) -> SyncResult<()> {
        let relative_path = self.local.media_relative_path(filename);
        let file = self.local.open(&relative_path).await?;
        self.upload_verified(UploadBody::File(file), &relative_path)
            .await
    }

    async fn upload_verified(&self, body: UploadBody, relative_path: &str) -> SyncResult<()> {
        self.remote
            .upload(body, relative_path, self.remote.acl_policy())
            .await?;

        if !self.remote.exists(relative_path).await? {
            return Err(SyncError::NotPersisted(relative_path.to_string()));
        }
        Ok(())
    }

    /// Push a freshly uploaded file to the bucket. Errors are logged, never
    /// returned, because the local save already succeeded.
    pub async fn mirror_uploaded(&self, uploaded: &UploadedFile) -> bool {
        if uploaded.path.is_empty() || uploaded.file.is_empty() {
            return false;
        }

        let real_path = Path::new(&uploaded.path).join(&uploaded.file);
        let relative_path = self.local.media_relative_path(&real_path.to_string_lossy());

        let result = async {
            let file = self.local.open(&relative_path).await?;
            self.remote
                .upload(UploadBody::File(file), &relative_path, self.remote.acl_policy())
                .await
        }
        .await;

        match result {
            Ok(handle) => handle.is_some(),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %real_path.display(),
                    "Failed to mirror uploaded file to bucket"
                );
                false
            }
        }
    }

    pub async fn file_exists(&self, path: &str) -> SyncResult<bool> {
        Ok(self.remote.exists(path).await?)
    }

    pub async fn copy_file(&self, source: &str, target: &str) -> SyncResult<bool> {
        Ok(self.remote.copy(source, target).await?.is_some())
    }

    pub async fn rename_file(&self, source: &str, target: &str) -> SyncResult<bool> {
        Ok(self.remote.rename(source, target).await?.is_some())
    }

    /// Delete an object if present. Returns whether it is gone afterwards.
    pub async fn delete_file(&self, path: &str) -> SyncResult<bool> {
        Ok(self.remote.delete(path).await?)
    }

    fn directory_prefix(&self, path: &str) -> String {
        let relative = self.local.media_relative_path(path);
        let relative = relative.trim_end_matches('/');
        if relative.is_empty() {
            String::new()
        } else {
            format!("{}/", relative)
        }
    }

    /// Names of the virtual subdirectories directly under `path`.
    pub async fn subdirectories(&self, path: &str) -> SyncResult<Vec<String>> {
        let prefix = self.directory_prefix(path);
        let page = self
            .remote
            .list(&ListOptions {
                prefix: Some(prefix.clone()),
                delimiter: true,
                ..Default::default()
            })
            .await?;

        Ok(page
            .prefixes
            .iter()
            .filter_map(|p| {
                let relative = self.remote.resolver().strip_prefix(p);
                relative
                    .strip_prefix(&prefix)
                    .map(|name| name.trim_end_matches('/').to_string())
            })
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// Files directly under `path`, with their content.
    pub async fn directory_files(&self, path: &str) -> SyncResult<Vec<MediaFile>> {
        let prefix = self.directory_prefix(path);
        let page = self
            .remote
            .list(&ListOptions {
                prefix: Some(prefix.clone()),
                delimiter: true,
                ..Default::default()
            })
            .await?;

        let mut files = Vec::with_capacity(page.objects.len());
        for object in &page.objects {
            let filename = self.remote.resolver().strip_prefix(object.key());
            if filename == prefix || filename.is_empty() {
                continue;
            }
            files.push(MediaFile {
                filename,
                content: object.content().await?,
            });
        }
        Ok(files)
    }

    /// Delete every object under the configured prefix.
    pub async fn clear(&self) -> SyncResult<usize> {
        let report = self.remote.delete_all(&ListOptions::default()).await?;
        if report.failed > 0 {
            tracing::warn!(
                deleted = report.deleted,
                failed = report.failed,
                "Bucket clear left objects behind"
            );
        }
        Ok(report.deleted)
    }
}
