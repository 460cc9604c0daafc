mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::Fixture;
use mediasync_core::AclPolicy;
use mediasync_services::{ImportFile, MediaBucket, UploadedFile};
use mediasync_storage::{RemoteStorage, UploadBody};

fn bucket(fixture: &Fixture) -> (MediaBucket, mediasync_storage::GcsStorage) {
    let storage = fixture.storage();
    (
        MediaBucket::new(Arc::new(storage.clone()), fixture.local()),
        storage,
    )
}

async fn seed(storage: &impl RemoteStorage, path: &str) {
    storage
        .upload(
            UploadBody::from(Bytes::copy_from_slice(path.as_bytes())),
            path,
            AclPolicy::PublicRead,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn export_pages_through_every_object() {
    let fixture = Fixture::new();
    let (bucket, storage) = bucket(&fixture);
    for path in ["a/1.jpg", "a/2.jpg", "b/3.jpg"] {
        seed(&storage, path).await;
    }

    let mut names = Vec::new();
    let mut token = None;
    loop {
        let page = bucket.export_files(token, 2).await.unwrap();
        for file in &page.files {
            assert_eq!(file.content.as_ref(), file.filename.as_bytes());
            names.push(file.filename.clone());
        }
        match page.next_page_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    assert_eq!(names, vec!["a/1.jpg", "a/2.jpg", "b/3.jpg"]);
}

#[tokio::test]
async fn import_collects_errors_and_continues() {
    let fixture = Fixture::new();
    let (bucket, storage) = bucket(&fixture);

    let errors = bucket
        .import_files(vec![
            ImportFile {
                filename: "logo.png".to_string(),
                directory: Some("wysiwyg/".to_string()),
                content: Bytes::from_static(b"logo"),
            },
            ImportFile {
                filename: "x.jpg".to_string(),
                directory: Some("catalog/tmp".to_string()),
                content: Bytes::from_static(b"tmp"),
            },
            ImportFile {
                filename: "banner.jpg".to_string(),
                directory: None,
                content: Bytes::from_static(b"banner"),
            },
        ])
        .await;

    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("catalog/tmp/x.jpg"));
    assert!(storage.exists("wysiwyg/logo.png").await.unwrap());
    assert!(storage.exists("banner.jpg").await.unwrap());
}

#[tokio::test]
async fn save_and_mirror_local_files() {
    let fixture = Fixture::new();
    let (bucket, storage) = bucket(&fixture);
    let local = fixture.local();
    local
        .write_locked("catalog/a.jpg", Bytes::from_static(b"a"))
        .await
        .unwrap();
    local
        .write_locked("wysiwyg/b.png", Bytes::from_static(b"b"))
        .await
        .unwrap();

    bucket.save_file("catalog/a.jpg").await.unwrap();
    assert_eq!(storage.download("catalog/a.jpg").await.unwrap().as_ref(), b"a");

    let uploaded = UploadedFile {
        path: fixture.media.path().join("wysiwyg").to_string_lossy().into_owned(),
        file: "b.png".to_string(),
    };
    assert!(bucket.mirror_uploaded(&uploaded).await);
    assert_eq!(storage.download("wysiwyg/b.png").await.unwrap().as_ref(), b"b");

    let missing = UploadedFile {
        path: fixture.media.path().to_string_lossy().into_owned(),
        file: "nope.png".to_string(),
    };
    assert!(!bucket.mirror_uploaded(&missing).await);
    assert!(bucket.save_file("nope.png").await.is_err());
}

#[tokio::test]
async fn directory_emulation() {
    let fixture = Fixture::new();
    let (bucket, storage) = bucket(&fixture);
    for path in [
        "wysiwyg/logo.png",
        "wysiwyg/banners/x.jpg",
        "wysiwyg/icons/y.png",
        "catalog/z.jpg",
    ] {
        seed(&storage, path).await;
    }

    assert_eq!(
        bucket.subdirectories("wysiwyg").await.unwrap(),
        vec!["banners", "icons"]
    );
    let files = bucket.directory_files("media/wysiwyg/").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "wysiwyg/logo.png");
    assert_eq!(files[0].content.as_ref(), b"wysiwyg/logo.png");
}

#[tokio::test]
async fn copy_rename_delete_and_clear() {
    let fixture = Fixture::new();
    let (bucket, storage) = bucket(&fixture);
    seed(&storage, "a.jpg").await;
    seed(&storage, "b.jpg").await;

    assert!(bucket.copy_file("a.jpg", "c.jpg").await.unwrap());
    assert!(!bucket.copy_file("missing.jpg", "d.jpg").await.unwrap());
    assert!(bucket.rename_file("c.jpg", "e.jpg").await.unwrap());
    assert!(!bucket.file_exists("c.jpg").await.unwrap());
    assert!(bucket.delete_file("e.jpg").await.unwrap());
    assert!(!bucket.file_exists("e.jpg").await.unwrap());

    assert_eq!(bucket.clear().await.unwrap(), 2);
    assert!(!bucket.file_exists("a.jpg").await.unwrap());
}
