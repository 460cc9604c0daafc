#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use mediasync_core::{AclPolicy, FallbackOrigin, FetchConfig};
use mediasync_infra::{CacheStore, LookupCache, MemoryCacheStore, OriginFetcher};
use mediasync_services::{SyncComponents, SyncOrchestrator};
use mediasync_storage::{GcsStorage, LocalMediaStore};
use mediasync_worker::{FetchDispatcher, FetchJob, QueueError};
use object_store::memory::InMemory;
use tempfile::TempDir;

pub const PREFIX: &str = "pre";

pub struct Fixture {
    pub media: TempDir,
    pub bucket: Arc<InMemory>,
    pub cache_store: Arc<dyn CacheStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_cache_store(Arc::new(MemoryCacheStore::new()))
    }

    pub fn with_cache_store(cache_store: Arc<dyn CacheStore>) -> Self {
        Self {
            media: tempfile::tempdir().unwrap(),
            bucket: Arc::new(InMemory::new()),
            cache_store,
        }
    }

    /// A fresh adapter over the shared in-memory bucket.
    pub fn storage(&self) -> GcsStorage {
        GcsStorage::with_store(
            self.bucket.clone(),
            "test-bucket",
            Some(PREFIX),
            AclPolicy::PublicRead,
        )
    }

    pub fn local(&self) -> LocalMediaStore {
        LocalMediaStore::new(self.media.path())
    }

    pub fn cache(&self) -> LookupCache {
        LookupCache::new(self.cache_store.clone())
    }

    pub fn components(&self, storage: &GcsStorage, fallback: Option<&str>) -> SyncComponents {
        SyncComponents {
            remote: Arc::new(storage.clone()),
            local: self.local(),
            cache: self.cache(),
            fetcher: OriginFetcher::new(&FetchConfig::default()).unwrap(),
            fallback: fallback.map(|url| FallbackOrigin::parse(url).unwrap().unwrap()),
        }
    }

    pub fn orchestrator(
        &self,
        storage: &GcsStorage,
        fallback: Option<&str>,
    ) -> (SyncOrchestrator, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let orchestrator = SyncOrchestrator::new(self.components(storage, fallback), dispatcher.clone());
        (orchestrator, dispatcher)
    }
}

/// Dispatcher that records jobs instead of running them.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub jobs: Mutex<Vec<FetchJob>>,
}

impl RecordingDispatcher {
    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl FetchDispatcher for RecordingDispatcher {
    fn dispatch(&self, job: FetchJob) -> Result<(), QueueError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Dispatcher whose queue is always full.
pub struct FullDispatcher;

impl FetchDispatcher for FullDispatcher {
    fn dispatch(&self, _job: FetchJob) -> Result<(), QueueError> {
        Err(QueueError::Full("Fetch"))
    }
}
