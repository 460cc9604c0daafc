use crate::keys::{has_extension, KeyResolver};
use crate::traits::{
    DeleteAllReport, ListOptions, ObjectHandle, ObjectPage, RemoteStorage, StorageError,
    StorageResult, UploadBody,
};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mediasync_core::{AclPolicy, Config};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, ClientOptions, HeaderMap, HeaderValue, ObjectMeta,
    ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Object metadata key recording the ACL policy requested at upload time.
const ACL_METADATA_KEY: &str = "predefined-acl";

/// XML API header applying a canned ACL to the object a request writes.
const ACL_HEADER: &str = "x-goog-acl";

/// Client options sending the configured canned ACL with every request, so
/// uploads, copies and renames all apply it.
fn acl_client_options(policy: AclPolicy) -> ClientOptions {
    let mut headers = HeaderMap::new();
    headers.insert(ACL_HEADER, HeaderValue::from_static(policy.xml_name()));
    ClientOptions::new().with_default_headers(headers)
}

/// Settings required to open the bucket.
#[derive(Debug, Clone, Default)]
pub struct GcsSettings {
    pub project_id: Option<String>,
    /// Absolute path of the service account key file.
    pub key_file_path: Option<PathBuf>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub acl_policy: AclPolicy,
}

impl GcsSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            project_id: config.gcs.project_id.clone(),
            key_file_path: config.key_file_absolute_path(),
            bucket: config.gcs.bucket.clone(),
            prefix: config.gcs.prefix.clone(),
            acl_policy: config.gcs.acl_policy,
        }
    }
}

/// Google Cloud Storage adapter
#[derive(Clone)]
pub struct GcsStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    resolver: KeyResolver,
    acl_policy: AclPolicy,
    requests: Arc<AtomicU64>,
}

impl GcsStorage {
    /// Open the bucket described by `settings`.
    ///
    /// Fails with `InvalidSetup` when the project, key file, or bucket name is missing.
    pub fn new(settings: GcsSettings) -> StorageResult<Self> {
        let project_id = settings.project_id.as_deref().unwrap_or_default().trim();
        let key_file_path = settings
            .key_file_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());

        let (false, Some(key_file_path)) = (project_id.is_empty(), key_file_path) else {
            return Err(StorageError::InvalidSetup(
                "Project name and/or key file path is invalid".to_string(),
            ));
        };

        let bucket = settings
            .bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| StorageError::InvalidSetup("Bucket name is invalid".to_string()))?
            .to_string();

        let store = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket.clone())
            .with_service_account_path(key_file_path.to_string_lossy())
            .with_client_options(acl_client_options(settings.acl_policy))
            .build()
            .map_err(|e| StorageError::InvalidSetup(e.to_string()))?;

        tracing::info!(
            project_id = %project_id,
            bucket = %bucket,
            prefix = settings.prefix.as_deref().unwrap_or(""),
            acl_policy = %settings.acl_policy,
            "GCS storage initialized"
        );

        Ok(Self::with_store(
            Arc::new(store),
            bucket,
            settings.prefix.as_deref(),
            settings.acl_policy,
        ))
    }

    /// Wrap an already-built object store (e.g. `object_store::memory::InMemory`).
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: Option<&str>,
        acl_policy: AclPolicy,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            resolver: KeyResolver::new(prefix),
            acl_policy,
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Number of requests issued to the bucket by this adapter and its clones.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn handle(&self, meta: &ObjectMeta, acl_policy: Option<AclPolicy>) -> ObjectHandle {
        ObjectHandle::new(
            meta.location.to_string(),
            true,
            meta.size,
            Some(meta.last_modified),
            acl_policy,
            self.store.clone(),
        )
    }

    async fn head_key(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        self.record_request();
        match self.store.head(&Path::from(key)).await {
            Ok(meta) => Ok(Some(meta)),
            Err(ObjectStoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    /// Existence check on an already-resolved key.
    async fn source_meta(&self, path: &str) -> StorageResult<Option<ObjectMeta>> {
        if !has_extension(path) {
            return Ok(None);
        }
        self.head_key(&self.resolver.to_remote_key(path)).await
    }

    fn list_prefix(&self, options: &ListOptions) -> Option<Path> {
        let prefix = match options.prefix.as_deref() {
            Some(p) => Some(self.resolver.apply_prefix(p)),
            None => self.resolver.prefix().map(String::from),
        };
        prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .map(Path::from)
    }
}

fn is_temporary(key: &str) -> bool {
    format!("/{}", key).to_lowercase().contains("/tmp/")
}

#[async_trait]
impl RemoteStorage for GcsStorage {
    fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    fn acl_policy(&self) -> AclPolicy {
        self.acl_policy
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.source_meta(path).await?.is_some())
    }

    async fn object(&self, path: &str) -> StorageResult<Option<ObjectHandle>> {
        Ok(self
            .source_meta(path)
            .await?
            .map(|meta| self.handle(&meta, None)))
    }

    async fn upload(
        &self,
        body: UploadBody,
        path: &str,
        acl_policy: AclPolicy,
    ) -> StorageResult<Option<ObjectHandle>> {
        let key = self.resolver.to_remote_key(path);

        if is_temporary(&key) {
            tracing::debug!(key = %key, "Skipping upload of temporary file");
            return Ok(None);
        }

        let bytes = body
            .into_bytes()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Failed to read upload body: {}", e)))?;
        let size = bytes.len() as u64;
        let location = Path::from(key.as_str());
        let start = std::time::Instant::now();

        if acl_policy != self.acl_policy {
            tracing::warn!(
                key = %key,
                requested = %acl_policy,
                applied = %self.acl_policy,
                "Per-upload ACL differs from the bucket client's; the client's canned ACL applies"
            );
        }

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::Metadata(ACL_METADATA_KEY.into()),
            AttributeValue::from(acl_policy.as_str()),
        );
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.record_request();
        let result = self
            .store
            .put_opts(&location, PutPayload::from(bytes), options)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "GCS upload failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            acl_policy = %acl_policy,
            e_tag = result.e_tag.as_deref().unwrap_or(""),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GCS upload successful"
        );

        Ok(Some(ObjectHandle::new(
            key,
            true,
            size,
            None,
            Some(acl_policy),
            self.store.clone(),
        )))
    }

    async fn download(&self, path: &str) -> StorageResult<bytes::Bytes> {
        let key = self.resolver.to_remote_key(path);
        let location = Path::from(key.as_str());
        let start = std::time::Instant::now();

        self.record_request();
        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::RemoteReadFailure(key.clone()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "GCS download failed"
                );
                StorageError::RemoteReadFailure(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::RemoteReadFailure(e.to_string()))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GCS download successful"
        );

        Ok(bytes)
    }

    async fn copy(&self, source: &str, target: &str) -> StorageResult<Option<ObjectHandle>> {
        let Some(meta) = self.source_meta(source).await? else {
            return Ok(None);
        };

        let to_key = self.resolver.apply_prefix(target);
        let to = Path::from(to_key.as_str());

        self.record_request();
        self.store
            .copy(&meta.location, &to)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        tracing::info!(
            from_key = %meta.location,
            to_key = %to_key,
            "GCS copy successful"
        );

        Ok(Some(ObjectHandle::new(
            to_key,
            true,
            meta.size,
            None,
            None,
            self.store.clone(),
        )))
    }

    async fn rename(&self, source: &str, target: &str) -> StorageResult<Option<ObjectHandle>> {
        let Some(meta) = self.source_meta(source).await? else {
            return Ok(None);
        };

        let to_key = self.resolver.apply_prefix(target);
        let to = Path::from(to_key.as_str());

        self.record_request();
        self.store
            .rename(&meta.location, &to)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        tracing::info!(
            from_key = %meta.location,
            to_key = %to_key,
            "GCS rename successful"
        );

        Ok(Some(ObjectHandle::new(
            to_key,
            true,
            meta.size,
            None,
            None,
            self.store.clone(),
        )))
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        if let Some(meta) = self.source_meta(path).await? {
            let start = std::time::Instant::now();

            self.record_request();
            self.store.delete(&meta.location).await.map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %meta.location,
                    "GCS delete failed"
                );
                StorageError::DeleteFailed(e.to_string())
            })?;

            tracing::info!(
                bucket = %self.bucket,
                key = %meta.location,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "GCS delete successful"
            );
        }

        Ok(!self.exists(path).await?)
    }

    async fn list(&self, options: &ListOptions) -> StorageResult<ObjectPage> {
        let prefix = self.list_prefix(options);
        let limit = options.max_results.unwrap_or(usize::MAX);
        let token = options.page_token.as_deref().filter(|t| !t.is_empty());

        self.record_request();

        let (mut metas, prefixes) = if options.delimiter {
            let listing = self
                .store
                .list_with_delimiter(prefix.as_ref())
                .await
                .map_err(|e| StorageError::BackendError(e.to_string()))?;

            let mut objects: Vec<ObjectMeta> = listing
                .objects
                .into_iter()
                .filter(|meta| token.is_none_or(|t| meta.location.as_ref() > t))
                .collect();
            objects.sort_by(|a, b| a.location.cmp(&b.location));
            objects.truncate(limit.saturating_add(1));

            let prefixes = if token.is_none() {
                listing
                    .common_prefixes
                    .iter()
                    .map(|p| format!("{}/", p))
                    .collect()
            } else {
                Vec::new()
            };
            (objects, prefixes)
        } else {
            let stream = match token {
                Some(t) => self
                    .store
                    .list_with_offset(prefix.as_ref(), &Path::from(t)),
                None => self.store.list(prefix.as_ref()),
            };
            let objects: Vec<ObjectMeta> = stream
                .take(limit.saturating_add(1))
                .try_collect()
                .await
                .map_err(|e| StorageError::BackendError(e.to_string()))?;
            (objects, Vec::new())
        };

        let next_page_token = if metas.len() > limit {
            metas.truncate(limit);
            metas.last().map(|meta| meta.location.to_string())
        } else {
            None
        };

        tracing::debug!(
            bucket = %self.bucket,
            prefix = prefix.as_ref().map(|p| p.to_string()).unwrap_or_default(),
            objects = metas.len(),
            prefixes = prefixes.len(),
            has_more = next_page_token.is_some(),
            "GCS list"
        );

        Ok(ObjectPage {
            objects: metas.iter().map(|meta| self.handle(meta, None)).collect(),
            prefixes,
            next_page_token,
        })
    }

    async fn delete_all(&self, options: &ListOptions) -> StorageResult<DeleteAllReport> {
        let mut report = DeleteAllReport::default();
        let mut page_options = ListOptions {
            delimiter: false,
            ..options.clone()
        };

        loop {
            let page = self.list(&page_options).await?;

            for object in &page.objects {
                self.record_request();
                match self.store.delete(&Path::from(object.key())).await {
                    Ok(()) | Err(ObjectStoreError::NotFound { .. }) => report.deleted += 1,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            bucket = %self.bucket,
                            key = %object.key(),
                            "GCS delete failed during bulk delete, continuing"
                        );
                        report.failed += 1;
                    }
                }
            }

            match page.next_page_token {
                Some(token) => page_options.page_token = Some(token),
                None => break,
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            deleted = report.deleted,
            failed = report.failed,
            "GCS bulk delete finished"
        );

        Ok(report)
    }
}
