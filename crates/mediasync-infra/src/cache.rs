//! Lookup cache
//!
//! Existence results are memoized per `(path, store)` pair in a single JSON
//! object stored under one cache type id. Every write loads the whole blob,
//! merges the new entry, and saves it back. Concurrent writers are not
//! serialized, so a lost update only costs a later redundant resolution.
//!
//! Each entry carries the time it was recorded. A `false` entry older than the
//! negative TTL reads as absent, so a path that was missing (or whose fetch
//! failed) is resolved again once the TTL has passed.

use crate::error::CacheError;
use async_trait::async_trait;
use chrono::Utc;
use mediasync_core::constants::{
    LOOKUP_CACHE_TAG, LOOKUP_CACHE_TYPE_ID, LOOKUP_FALSE_TTL_SECS, STORE_QUERY_PARAM,
};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs;

/// Host key-value cache: opaque blobs addressed by a type id.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, type_id: &str) -> Result<Option<String>, CacheError>;

    async fn save(&self, blob: String, type_id: &str, tags: &[&str]) -> Result<(), CacheError>;
}

/// In-process cache store, mostly for tests and one-shot commands.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, (String, Vec<String>)>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags recorded with the last save of `type_id`.
    pub fn tags(&self, type_id: &str) -> Vec<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(type_id).map(|(_, tags)| tags.clone()))
            .unwrap_or_default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self, type_id: &str) -> Result<Option<String>, CacheError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| std::io::Error::other("cache store mutex poisoned"))?;
        Ok(entries.get(type_id).map(|(blob, _)| blob.clone()))
    }

    async fn save(&self, blob: String, type_id: &str, tags: &[&str]) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| std::io::Error::other("cache store mutex poisoned"))?;
        entries.insert(
            type_id.to_string(),
            (blob, tags.iter().map(|t| t.to_string()).collect()),
        );
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CacheRecord {
    tags: Vec<String>,
    data: String,
}

/// Cache store persisting each type id as a JSON file under a directory.
///
/// Saves go through a temporary file and a rename, so readers never observe a
/// partially written blob.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, type_id: &str) -> PathBuf {
        let name: String = type_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn load(&self, type_id: &str) -> Result<Option<String>, CacheError> {
        let raw = match fs::read_to_string(self.file_for(type_id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: CacheRecord = serde_json::from_str(&raw)?;
        Ok(Some(record.data))
    }

    async fn save(&self, blob: String, type_id: &str, tags: &[&str]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await?;

        let record = CacheRecord {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            data: blob,
        };
        let payload = serde_json::to_vec(&record)?;
        let dir = self.dir.clone();
        let target = self.file_for(type_id);

        // Each save stages into its own uniquely named file in the same
        // directory, so concurrent writers never share a staging path.
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut staging = tempfile::NamedTempFile::new_in(&dir)?;
            staging.write_all(&payload)?;
            staging.as_file().sync_all()?;
            staging.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
struct LookupEntry {
    existed: bool,
    /// Unix timestamp (seconds) of the resolution that produced this entry.
    checked_at: i64,
}

/// Existence memo for media lookups, keyed by path and store scope.
#[derive(Clone)]
pub struct LookupCache {
    store: Arc<dyn CacheStore>,
    false_ttl: Duration,
}

impl LookupCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            false_ttl: Duration::from_secs(LOOKUP_FALSE_TTL_SECS),
        }
    }

    /// Override how long a `false` entry is trusted. A zero TTL makes every
    /// `false` entry read as absent.
    pub fn with_false_ttl(mut self, ttl: Duration) -> Self {
        self.false_ttl = ttl;
        self
    }

    pub fn false_ttl(&self) -> Duration {
        self.false_ttl
    }

    pub fn entry_key(path: &str, store_code: &str) -> String {
        format!("{}?{}={}", path, STORE_QUERY_PARAM, store_code)
    }

    async fn load_entries(&self) -> Result<BTreeMap<String, LookupEntry>, CacheError> {
        match self.store.load(LOOKUP_CACHE_TYPE_ID).await? {
            Some(blob) if !blob.trim().is_empty() => Ok(serde_json::from_str(&blob)?),
            _ => Ok(BTreeMap::new()),
        }
    }

    fn is_expired(&self, entry: &LookupEntry, now: i64) -> bool {
        let ttl = i64::try_from(self.false_ttl.as_secs()).unwrap_or(i64::MAX);
        !entry.existed && now.saturating_sub(entry.checked_at) >= ttl
    }

    /// Cached existence, `None` if the pair was never resolved or its `false`
    /// entry has outlived the negative TTL.
    pub async fn get(&self, path: &str, store_code: &str) -> Result<Option<bool>, CacheError> {
        let entries = self.load_entries().await?;
        let now = Utc::now().timestamp();

        Ok(entries
            .get(&Self::entry_key(path, store_code))
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.existed))
    }

    /// Record an existence result, merging it into the stored mapping.
    ///
    /// Expired `false` entries of other paths are pruned on the way.
    pub async fn put(&self, path: &str, store_code: &str, existed: bool) -> Result<(), CacheError> {
        let mut entries = match self.load_entries().await {
            Ok(entries) => entries,
            Err(CacheError::Serialization(e)) => {
                tracing::warn!(error = %e, "Discarding unreadable lookup cache blob");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        let now = Utc::now().timestamp();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        entries.insert(
            Self::entry_key(path, store_code),
            LookupEntry {
                existed,
                checked_at: now,
            },
        );

        self.save_entries(&entries).await?;

        tracing::debug!(path = %path, store_code = %store_code, existed, "Lookup cache updated");
        Ok(())
    }

    /// Drop every memoized lookup.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.save_entries(&BTreeMap::new()).await?;
        tracing::info!("Lookup cache cleared");
        Ok(())
    }

    async fn save_entries(&self, entries: &BTreeMap<String, LookupEntry>) -> Result<(), CacheError> {
        let blob = serde_json::to_string(entries)?;
        self.store
            .save(blob, LOOKUP_CACHE_TYPE_ID, &[LOOKUP_CACHE_TAG])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_until_put() {
        let store = MemoryCacheStore::new();
        let cache = LookupCache::new(Arc::new(store.clone()));

        assert_eq!(cache.get("catalog/a.jpg", "default").await.unwrap(), None);
        cache.put("catalog/a.jpg", "default", true).await.unwrap();
        assert_eq!(cache.get("catalog/a.jpg", "default").await.unwrap(), Some(true));
        assert_eq!(cache.get("catalog/a.jpg", "fr").await.unwrap(), None);
        assert_eq!(store.tags(LOOKUP_CACHE_TYPE_ID), vec![LOOKUP_CACHE_TAG]);
    }

    #[tokio::test]
    async fn put_merges_and_overwrites() {
        let store = MemoryCacheStore::new();
        let cache = LookupCache::new(Arc::new(store.clone()));

        cache.put("a.jpg", "default", false).await.unwrap();
        cache.put("b.jpg", "default", true).await.unwrap();
        cache.put("a.jpg", "default", true).await.unwrap();

        let blob = store.load(LOOKUP_CACHE_TYPE_ID).await.unwrap().unwrap();
        let entries: BTreeMap<String, LookupEntry> = serde_json::from_str(&blob).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries["a.jpg?store=default"].existed);
        assert!(entries["b.jpg?store=default"].existed);
    }

    #[tokio::test]
    async fn corrupt_blob_is_replaced_on_put() {
        let store = MemoryCacheStore::new();
        store
            .save("not json".to_string(), LOOKUP_CACHE_TYPE_ID, &[])
            .await
            .unwrap();
        let cache = LookupCache::new(Arc::new(store));

        assert!(matches!(
            cache.get("a.jpg", "default").await,
            Err(CacheError::Serialization(_))
        ));
        cache.put("a.jpg", "default", true).await.unwrap();
        assert_eq!(cache.get("a.jpg", "default").await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let cache = LookupCache::new(Arc::new(FileCacheStore::new(dir.path().join("cache"))));
        cache.put("wysiwyg/logo.png", "default", true).await.unwrap();

        let reopened = LookupCache::new(Arc::new(FileCacheStore::new(dir.path().join("cache"))));
        assert_eq!(
            reopened.get("wysiwyg/logo.png", "default").await.unwrap(),
            Some(true)
        );
    }

    #[tokio::test]
    async fn expired_false_entry_reads_as_absent() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());

        let strict = LookupCache::new(store.clone()).with_false_ttl(Duration::ZERO);
        strict.put("catalog/late.jpg", "default", false).await.unwrap();
        strict.put("catalog/here.jpg", "default", true).await.unwrap();

        assert_eq!(strict.get("catalog/late.jpg", "default").await.unwrap(), None);
        assert_eq!(
            strict.get("catalog/here.jpg", "default").await.unwrap(),
            Some(true)
        );

        let lenient = LookupCache::new(store).with_false_ttl(Duration::from_secs(3600));
        lenient.put("catalog/late.jpg", "default", false).await.unwrap();
        assert_eq!(
            lenient.get("catalog/late.jpg", "default").await.unwrap(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn stale_false_entries_are_pruned_on_put() {
        let store = MemoryCacheStore::new();
        let cache = LookupCache::new(Arc::new(store.clone())).with_false_ttl(Duration::ZERO);

        cache.put("a.jpg", "default", false).await.unwrap();
        cache.put("b.jpg", "default", true).await.unwrap();

        let blob = store.load(LOOKUP_CACHE_TYPE_ID).await.unwrap().unwrap();
        let entries: BTreeMap<String, LookupEntry> = serde_json::from_str(&blob).unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["b.jpg?store=default"]);
    }

    #[tokio::test]
    async fn clear_drops_all_entries() {
        let cache = LookupCache::new(Arc::new(MemoryCacheStore::new()));
        cache.put("a.jpg", "default", true).await.unwrap();
        cache.put("b.jpg", "default", false).await.unwrap();

        cache.clear().await.unwrap();

        assert_eq!(cache.get("a.jpg", "default").await.unwrap(), None);
        assert_eq!(cache.get("b.jpg", "default").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_file_store_puts_never_fail_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LookupCache::new(Arc::new(FileCacheStore::new(dir.path().join("cache"))));

        for round in 0..10 {
            let mut tasks = tokio::task::JoinSet::new();
            for i in 0..16 {
                let cache = cache.clone();
                tasks.spawn(async move {
                    cache
                        .put(&format!("catalog/{}-{}.jpg", round, i), "default", i % 2 == 0)
                        .await
                });
            }
            while let Some(result) = tasks.join_next().await {
                result.unwrap().unwrap();
            }

            // Lost updates are tolerated, an unreadable blob is not.
            cache.get("catalog/0-0.jpg", "default").await.unwrap();
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("cache"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "staging files left behind: {:?}", leftovers);
    }
}
