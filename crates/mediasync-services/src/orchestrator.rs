//! Synchronization orchestrator
//!
//! Resolves a media request against, in order: the local media directory, the
//! lookup cache, the bucket, and the fallback origin. Outside the background
//! fetch context a local miss is never resolved inline; it is handed to the
//! fetch queue and reported as pending.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mediasync_core::{Config, FallbackOrigin, RequestContext};
use mediasync_infra::{FetchSource, FileCacheStore, LookupCache, OriginFetcher};
use mediasync_storage::{create_remote_storage, LocalMediaStore, RemoteStorage, UploadBody};
use mediasync_worker::{
    FallbackUploadMessage, FetchDispatcher, FetchHandler, FetchJob, FetchQueue, FetchQueueConfig,
};

use crate::error::{SyncError, SyncResult};

/// Collaborators the orchestrator works with.
pub struct SyncComponents {
    pub remote: Arc<dyn RemoteStorage>,
    pub local: LocalMediaStore,
    pub cache: LookupCache,
    pub fetcher: OriginFetcher,
    pub fallback: Option<FallbackOrigin>,
}

impl SyncComponents {
    /// Wire the bucket adapter, media directory, file-backed lookup cache, and
    /// fallback fetcher from configuration.
    pub fn from_config(config: &Config) -> SyncResult<Self> {
        Ok(Self {
            remote: create_remote_storage(config)?,
            local: LocalMediaStore::new(&config.media_dir),
            cache: LookupCache::new(Arc::new(FileCacheStore::new(&config.cache_dir)))
                .with_false_ttl(config.lookup_false_ttl),
            fetcher: OriginFetcher::new(&config.fetch)?,
            fallback: config.fallback.clone(),
        })
    }
}

/// Outcome of resolving a media path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The file was already in the media directory.
    Local(PathBuf),
    /// Downloaded from the bucket.
    Downloaded(PathBuf),
    /// Retrieved from the fallback origin. `uploaded` is false when the content
    /// was a resized variant, which is never mirrored to the bucket.
    Fallback {
        path: PathBuf,
        source: FetchSource,
        uploaded: bool,
    },
    /// A background fetch was queued; the file is not available yet.
    Pending,
    /// Not available, either known missing or already being fetched.
    Missing,
}

impl Resolution {
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Resolution::Local(path)
            | Resolution::Downloaded(path)
            | Resolution::Fallback { path, .. } => Some(path),
            Resolution::Pending | Resolution::Missing => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.local_path().is_some()
    }
}

pub struct SyncOrchestrator {
    remote: Arc<dyn RemoteStorage>,
    local: LocalMediaStore,
    cache: LookupCache,
    fetcher: OriginFetcher,
    fallback: Option<FallbackOrigin>,
    dispatcher: Arc<dyn FetchDispatcher>,
}

impl SyncOrchestrator {
    pub fn new(components: SyncComponents, dispatcher: Arc<dyn FetchDispatcher>) -> Self {
        Self {
            remote: components.remote,
            local: components.local,
            cache: components.cache,
            fetcher: components.fetcher,
            fallback: components.fallback,
            dispatcher,
        }
    }

    /// Build an orchestrator fed by its own in-process fetch queue.
    ///
    /// The queue's workers hold the orchestrator weakly; dropping every
    /// returned handle stops them. Must be called inside a tokio runtime.
    pub fn with_fetch_queue(
        components: SyncComponents,
        config: FetchQueueConfig,
    ) -> (Arc<Self>, FetchQueue) {
        let (queue, worker) = FetchQueue::channel(config);
        let orchestrator = Arc::new(Self::new(components, Arc::new(queue.clone())));

        let handler: Arc<dyn FetchHandler> = orchestrator.clone();
        worker.spawn(Arc::downgrade(&handler));

        (orchestrator, queue)
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStorage> {
        &self.remote
    }

    pub fn local(&self) -> &LocalMediaStore {
        &self.local
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Resolve a media request.
    ///
    /// `path` may be media-relative, `media/`-prefixed, or absolute inside the
    /// media directory.
    #[tracing::instrument(
        skip(self, context),
        fields(store_code = %context.store_code, background = context.is_background_fetch)
    )]
    pub async fn resolve(&self, path: &str, context: &RequestContext) -> SyncResult<Resolution> {
        let local_path = self.local.media_relative_path(path);
        let store_code = context.store_code.as_str();

        if context.is_background_fetch {
            return self.fetch_now(&local_path, store_code).await;
        }

        let cached = self.cached(&local_path, store_code).await;

        if self.local.is_file(&local_path).await {
            if cached != Some(true) {
                self.remember(&local_path, store_code, true).await?;
            }
            return Ok(Resolution::Local(self.local.key_to_path(&local_path)?));
        }

        if cached == Some(false) {
            tracing::debug!(
                local_path = %local_path,
                "Lookup cache marks path as missing or already being fetched"
            );
            return Ok(Resolution::Missing);
        }

        let job = FetchJob {
            remote_key: self.remote.resolver().to_remote_key(&local_path),
            local_path: local_path.clone(),
            store_code: store_code.to_string(),
        };

        // Marked before dispatch so a fast worker's `true` is never overwritten.
        self.remember(&local_path, store_code, false).await?;

        match self.dispatcher.dispatch(job) {
            Ok(()) => Ok(Resolution::Pending),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    local_path = %local_path,
                    "Background fetch not dispatched"
                );
                Ok(Resolution::Missing)
            }
        }
    }

    /// Resolve synchronously against the bucket and fallback origin.
    ///
    /// Any failure leaves the lookup cache entry at `false`.
    async fn fetch_now(&self, local_path: &str, store_code: &str) -> SyncResult<Resolution> {
        match self.fetch_from_sources(local_path, store_code).await {
            Ok(resolution) => {
                self.remember(local_path, store_code, resolution.is_available())
                    .await?;
                Ok(resolution)
            }
            Err(e) => {
                self.forget_on_failure(local_path, store_code).await;
                Err(e)
            }
        }
    }

    async fn fetch_from_sources(
        &self,
        local_path: &str,
        store_code: &str,
    ) -> SyncResult<Resolution> {
        if self.remote.exists(local_path).await? {
            let content = self.remote.download(local_path).await?;
            let path = self.local.write_locked(local_path, content).await?;
            return Ok(Resolution::Downloaded(path));
        }

        let Some(origin) = self.fallback.as_ref() else {
            tracing::debug!(local_path = %local_path, "Not in bucket and no fallback origin");
            return Ok(Resolution::Missing);
        };

        let Some(fetched) = self
            .fetcher
            .fetch_for_path(origin, store_code, local_path)
            .await
        else {
            tracing::debug!(local_path = %local_path, "Not in bucket or at fallback origin");
            return Ok(Resolution::Missing);
        };

        // Uploaded before the local write; a failed write does not undo the upload.
        let uploaded = match fetched.source {
            FetchSource::Original => self
                .remote
                .upload(
                    UploadBody::Bytes(fetched.bytes.clone()),
                    local_path,
                    self.remote.acl_policy(),
                )
                .await?
                .is_some(),
            FetchSource::Variant => false,
        };

        let path = self.local.write_locked(local_path, fetched.bytes).await?;

        tracing::info!(
            local_path = %local_path,
            url = %fetched.url,
            uploaded,
            "Backfilled from fallback origin"
        );

        Ok(Resolution::Fallback {
            path,
            source: fetched.source,
            uploaded,
        })
    }

    /// Download a bucket object into the media directory.
    pub async fn download_object(
        &self,
        remote_path: &str,
        local_path: &str,
        store_code: &str,
    ) -> SyncResult<PathBuf> {
        let local_path = self.local.media_relative_path(local_path);

        let result: SyncResult<PathBuf> = async {
            if !self.remote.exists(remote_path).await? {
                return Err(SyncError::NotFound(
                    self.remote.resolver().to_local_object_path(remote_path),
                ));
            }
            let content = self.remote.download(remote_path).await?;
            Ok(self.local.write_locked(&local_path, content).await?)
        }
        .await;

        match result {
            Ok(path) => {
                self.remember(&local_path, store_code, true).await?;
                Ok(path)
            }
            Err(e) => {
                self.forget_on_failure(&local_path, store_code).await;
                Err(e)
            }
        }
    }

    /// Fetch `url` and upload it under `remote_path`, optionally keeping a local
    /// copy. Returns whether the URL yielded content.
    pub async fn upload_from_url(
        &self,
        url: &str,
        remote_path: &str,
        local_path: Option<&str>,
        store_code: &str,
    ) -> SyncResult<bool> {
        let local_path = local_path.map(|p| self.local.media_relative_path(p));

        let Some(content) = self.fetcher.fetch(url).await else {
            if let Some(local_path) = local_path.as_deref() {
                self.remember(local_path, store_code, false).await?;
            }
            return Ok(false);
        };

        let result = self
            .upload_and_store(content, remote_path, local_path.as_deref())
            .await;

        match (result, local_path.as_deref()) {
            (Ok(()), Some(local_path)) => {
                self.remember(local_path, store_code, true).await?;
                Ok(true)
            }
            (Ok(()), None) => Ok(true),
            (Err(e), Some(local_path)) => {
                self.forget_on_failure(local_path, store_code).await;
                Err(e)
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn upload_and_store(
        &self,
        content: Bytes,
        remote_path: &str,
        local_path: Option<&str>,
    ) -> SyncResult<()> {
        let handle = self
            .remote
            .upload(
                UploadBody::Bytes(content.clone()),
                remote_path,
                self.remote.acl_policy(),
            )
            .await?;

        if handle.is_none() {
            tracing::debug!(remote_path = %remote_path, "Upload skipped for temporary path");
        }

        if let Some(local_path) = local_path {
            self.local.write_locked(local_path, content).await?;
        }
        Ok(())
    }

    async fn cached(&self, local_path: &str, store_code: &str) -> Option<bool> {
        match self.cache.get(local_path, store_code).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, local_path = %local_path, "Lookup cache unreadable");
                None
            }
        }
    }

    async fn remember(&self, local_path: &str, store_code: &str, existed: bool) -> SyncResult<()> {
        Ok(self.cache.put(local_path, store_code, existed).await?)
    }

    async fn forget_on_failure(&self, local_path: &str, store_code: &str) {
        if let Err(e) = self.cache.put(local_path, store_code, false).await {
            tracing::warn!(
                error = %e,
                local_path = %local_path,
                "Failed to record lookup failure"
            );
        }
    }
}

#[async_trait]
impl FetchHandler for SyncOrchestrator {
    async fn handle_fetch(self: Arc<Self>, job: &FetchJob) -> anyhow::Result<()> {
        let context = RequestContext::background_fetch(job.store_code.clone());
        let resolution = self.resolve(&job.local_path, &context).await?;

        tracing::info!(
            remote_key = %job.remote_key,
            local_path = %job.local_path,
            available = resolution.is_available(),
            "Background fetch resolved"
        );
        Ok(())
    }

    async fn handle_fallback_upload(
        self: Arc<Self>,
        message: &FallbackUploadMessage,
    ) -> anyhow::Result<()> {
        let uploaded = self
            .upload_from_url(&message.url, &message.remote_key, None, "")
            .await?;
        if !uploaded {
            tracing::debug!(url = %message.url, "Fallback URL had no content to upload");
        }
        Ok(())
    }
}
