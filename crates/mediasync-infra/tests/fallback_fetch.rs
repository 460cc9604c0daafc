use mediasync_core::{FallbackOrigin, FetchConfig};
use mediasync_infra::{FetchSource, OriginFetcher};

const VARIANT: &str = "catalog/product/cache/0123456789abcdef0123456789abcdef/a/b.jpg";

#[tokio::test]
async fn variant_miss_retries_original_once() {
    let mut server = mockito::Server::new_async().await;
    let variant = server
        .mock("GET", format!("/{}", VARIANT).as_str())
        .with_status(404)
        .expect(1)
        .create_async()
        .await;
    let original = server
        .mock("GET", "/catalog/a/b.jpg")
        .with_status(200)
        .with_body("original")
        .expect(1)
        .create_async()
        .await;

    let origin = FallbackOrigin::parse(&server.url()).unwrap().unwrap();
    let fetcher = OriginFetcher::new(&FetchConfig::default()).unwrap();

    let fetched = fetcher
        .fetch_for_path(&origin, "default", VARIANT)
        .await
        .unwrap();
    assert_eq!(fetched.source, FetchSource::Original);
    assert_eq!(fetched.bytes.as_ref(), b"original");
    assert!(fetched.url.ends_with("/catalog/a/b.jpg"));

    variant.assert_async().await;
    original.assert_async().await;
}

#[tokio::test]
async fn variant_hit_is_marked_as_variant() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", format!("/{}", VARIANT).as_str())
        .with_status(200)
        .with_body("resized")
        .create_async()
        .await;

    let origin = FallbackOrigin::parse(&server.url()).unwrap().unwrap();
    let fetcher = OriginFetcher::new(&FetchConfig::default()).unwrap();

    let fetched = fetcher
        .fetch_for_path(&origin, "default", VARIANT)
        .await
        .unwrap();
    assert_eq!(fetched.source, FetchSource::Variant);
    assert_eq!(fetched.bytes.as_ref(), b"resized");
}

#[tokio::test]
async fn plain_miss_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let miss = server
        .mock("GET", "/wysiwyg/logo.png")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let origin = FallbackOrigin::parse(&server.url()).unwrap().unwrap();
    let fetcher = OriginFetcher::new(&FetchConfig::default()).unwrap();

    assert!(fetcher
        .fetch_for_path(&origin, "default", "wysiwyg/logo.png")
        .await
        .is_none());
    miss.assert_async().await;
}

#[tokio::test]
async fn scoped_origin_uses_store_url() {
    let mut default_server = mockito::Server::new_async().await;
    let mut fr_server = mockito::Server::new_async().await;
    let fr = fr_server
        .mock("GET", "/a.jpg")
        .with_status(200)
        .with_body("fr")
        .create_async()
        .await;
    let default = default_server
        .mock("GET", "/a.jpg")
        .with_status(200)
        .with_body("default")
        .create_async()
        .await;

    let raw = format!("default={},fr={}", default_server.url(), fr_server.url());
    let origin = FallbackOrigin::parse(&raw).unwrap().unwrap();
    let fetcher = OriginFetcher::new(&FetchConfig::default()).unwrap();

    let fetched = fetcher.fetch_for_path(&origin, "fr", "a.jpg").await.unwrap();
    assert_eq!(fetched.bytes.as_ref(), b"fr");
    let fetched = fetcher.fetch_for_path(&origin, "de", "a.jpg").await.unwrap();
    assert_eq!(fetched.bytes.as_ref(), b"default");

    fr.assert_async().await;
    default.assert_async().await;
}
