mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::Fixture;
use mediasync_core::RequestContext;
use mediasync_infra::{CacheError, CacheStore, MemoryCacheStore};
use mediasync_services::{FetchQueueConfig, Resolution, SyncOrchestrator};
use mediasync_storage::RemoteStorage;
use mediasync_worker::{fallback_upload_channel, FetchHandler};
use tokio::sync::Barrier;

/// Holds the first `parties` loads until all of them have arrived, so every
/// participant reads the cache before anyone writes it.
struct RendezvousCacheStore {
    inner: MemoryCacheStore,
    barrier: Barrier,
    parties: usize,
    loads: AtomicUsize,
}

impl RendezvousCacheStore {
    fn new(parties: usize) -> Self {
        Self {
            inner: MemoryCacheStore::new(),
            barrier: Barrier::new(parties),
            parties,
            loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CacheStore for RendezvousCacheStore {
    async fn load(&self, type_id: &str) -> Result<Option<String>, CacheError> {
        if self.loads.fetch_add(1, Ordering::SeqCst) < self.parties {
            self.barrier.wait().await;
        }
        self.inner.load(type_id).await
    }

    async fn save(&self, blob: String, type_id: &str, tags: &[&str]) -> Result<(), CacheError> {
        self.inner.save(blob, type_id, tags).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_fetch_makes_file_available() {
    let fixture = Fixture::new();
    let storage = fixture.storage();
    fixture
        .storage()
        .upload(
            bytes::Bytes::from_static(b"remote").into(),
            "catalog/a.jpg",
            mediasync_core::AclPolicy::PublicRead,
        )
        .await
        .unwrap();

    let (orchestrator, queue) =
        SyncOrchestrator::with_fetch_queue(fixture.components(&storage, None), FetchQueueConfig::default());
    let context = RequestContext::request("default");

    assert_eq!(
        orchestrator.resolve("catalog/a.jpg", &context).await.unwrap(),
        Resolution::Pending
    );
    queue.wait_idle().await;

    assert_eq!(
        fixture.local().read("catalog/a.jpg").await.unwrap().as_ref(),
        b"remote"
    );
    assert_eq!(
        fixture.cache().get("catalog/a.jpg", "default").await.unwrap(),
        Some(true)
    );
    assert!(matches!(
        orchestrator.resolve("catalog/a.jpg", &context).await.unwrap(),
        Resolution::Local(_)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_misses_converge() {
    let mut origin = mockito::Server::new_async().await;
    let mock = origin
        .mock("GET", "/catalog/dup.jpg")
        .with_status(200)
        .with_body("origin bytes")
        .expect_at_least(1)
        .create_async()
        .await;

    let fixture = Fixture::with_cache_store(Arc::new(RendezvousCacheStore::new(2)));
    let storage = fixture.storage();

    // Two independent request handlers sharing only the bucket, the media
    // directory, and the cache store.
    let (first, first_queue) = SyncOrchestrator::with_fetch_queue(
        fixture.components(&storage, Some(&origin.url())),
        FetchQueueConfig::default(),
    );
    let (second, second_queue) = SyncOrchestrator::with_fetch_queue(
        fixture.components(&storage, Some(&origin.url())),
        FetchQueueConfig::default(),
    );

    let context = RequestContext::request("default");
    let (a, b) = tokio::join!(
        first.resolve("catalog/dup.jpg", &context),
        second.resolve("catalog/dup.jpg", &context)
    );
    assert_eq!(a.unwrap(), Resolution::Pending);
    assert_eq!(b.unwrap(), Resolution::Pending);

    first_queue.wait_idle().await;
    second_queue.wait_idle().await;

    assert_eq!(
        fixture.local().read("catalog/dup.jpg").await.unwrap().as_ref(),
        b"origin bytes"
    );
    assert_eq!(
        storage.download("catalog/dup.jpg").await.unwrap().as_ref(),
        b"origin bytes"
    );
    assert_eq!(
        fixture.cache().get("catalog/dup.jpg", "default").await.unwrap(),
        Some(true)
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn fallback_upload_messages_reach_the_bucket() {
    let mut origin = mockito::Server::new_async().await;
    origin
        .mock("GET", "/img/a.jpg")
        .with_status(200)
        .with_body("queued")
        .create_async()
        .await;

    let fixture = Fixture::new();
    let storage = fixture.storage();
    let (orchestrator, _queue) =
        SyncOrchestrator::with_fetch_queue(fixture.components(&storage, None), FetchQueueConfig::default());

    let (publisher, consumer) = fallback_upload_channel(16);
    let handler: Arc<dyn FetchHandler> = orchestrator.clone();
    let worker = consumer.spawn(Arc::downgrade(&handler));

    publisher
        .publish(&format!("{}/img/a.jpg", origin.url()), "pre/catalog/a.jpg")
        .unwrap();
    publisher
        .publish(&format!("{}/img/missing.jpg", origin.url()), "pre/catalog/b.jpg")
        .unwrap();
    drop(publisher);
    worker.await.unwrap();

    assert_eq!(storage.download("catalog/a.jpg").await.unwrap().as_ref(), b"queued");
    assert!(!storage.exists("catalog/b.jpg").await.unwrap());
    assert!(!fixture.local().is_file("catalog/a.jpg").await);
}
