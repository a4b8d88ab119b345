//! IRemoteStore operations against the mocked API

use std::sync::Arc;

use serde_json::json;
use tokio::io::AsyncReadExt;
use wiremock::matchers::{body_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use drivesync_core::domain::{ContentHash, RemoteId};
use drivesync_core::ports::{IRemoteStore, MetadataPatch, NewObject};

use crate::common::{self, file_json, folder_json, HELLO_MD5};

fn id(s: &str) -> RemoteId {
    RemoteId::new(s).unwrap()
}

// ============================================================================
// Read operations
// ============================================================================

#[tokio::test]
async fn test_about_maps_root_and_revision() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .and(query_param("fields", "largestChangeId,rootFolderId"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "largestChangeId": "4521", "rootFolderId": "0AbCdRoot"
        })))
        .mount(&server)
        .await;

    let about = store.about().await.unwrap();
    assert_eq!(about.root_id, id("0AbCdRoot"));
    assert_eq!(about.largest_revision_id, 4521);
    assert_eq!(store.current_largest_revision().await.unwrap(), 4521);
}

#[tokio::test]
async fn test_get_objects_preserves_order() {
    let (server, store) = common::setup_store_mock().await;
    for (i, title) in ["a", "b", "c"].iter().enumerate() {
        common::mount_file_metadata(&server, &format!("f{i}"), file_json(&format!("f{i}"), title, "ROOT", None))
            .await;
    }

    let objects = store
        .get_objects(&[id("f2"), id("f0"), id("f1")])
        .await
        .unwrap();
    let titles: Vec<&str> = objects.iter().map(|o| o.title.as_str()).collect();
    assert_eq!(titles, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn test_download_streams_content_with_checksum() {
    let (server, store) = common::setup_store_mock().await;
    common::mount_file_metadata(&server, "f1", file_json("f1", "hello.txt", "ROOT", Some(HELLO_MD5)))
        .await;
    common::mount_media(&server, "f1", b"hello").await;

    let mut download = store.download_content(&id("f1")).await.unwrap();
    let mut content = Vec::new();
    download.content.read_to_end(&mut content).await.unwrap();

    assert_eq!(content, b"hello");
    assert_eq!(download.content_hash, Some(ContentHash::new(HELLO_MD5).unwrap()));
}

#[tokio::test]
async fn test_download_large_content() {
    let (server, store) = common::setup_store_mock().await;
    let content: Vec<u8> = (0..1_048_576).map(|i| (i % 251) as u8).collect();
    common::mount_file_metadata(&server, "big", file_json("big", "big.bin", "ROOT", None)).await;
    common::mount_media(&server, "big", &content).await;

    let mut download = store.download_content(&id("big")).await.unwrap();
    let mut received = Vec::new();
    download.content.read_to_end(&mut received).await.unwrap();
    assert_eq!(received.len(), content.len());
    assert_eq!(received, content);
}

#[tokio::test]
async fn test_batch_calls_run_on_spawned_tasks() {
    let (server, store) = common::setup_store_mock().await;
    common::mount_file_metadata(&server, "f0", file_json("f0", "a", "ROOT", None)).await;
    Mock::given(method("POST"))
        .and(path("/drive/v2/files/f0/trash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "f0"})))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn IRemoteStore> = Arc::new(store);
    let ids = vec![id("f0")];
    let task = tokio::spawn(async move {
        let objects = store.get_objects(&ids).await?;
        store.trash_many(&ids).await?;
        Ok::<_, anyhow::Error>(objects)
    });

    let objects = task.await.unwrap().unwrap();
    assert_eq!(objects[0].title, "a");
}

// ============================================================================
// Write operations
// ============================================================================

#[tokio::test]
async fn test_upload_new_sends_multipart_related() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v2/files"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains(r#""title":"hello.txt""#))
        .and(body_string_contains(r#""parents":[{"id":"d1"}]"#))
        .and(body_string_contains("hello"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(file_json("new1", "hello.txt", "d1", Some(HELLO_MD5))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let object = store
        .upload_new(NewObject::new("hello.txt", id("d1")), b"hello".to_vec())
        .await
        .unwrap();
    assert_eq!(object.id, id("new1"));
    assert_eq!(object.parent_id, id("d1"));
    assert_eq!(object.content_hash.unwrap().as_str(), HELLO_MD5);

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("multipart/related; boundary="));
}

#[tokio::test]
async fn test_upload_with_modified_time_sets_modified_date() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v2/files"))
        .and(query_param("setModifiedDate", "true"))
        .and(body_string_contains("modifiedDate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("n", "x", "ROOT", None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut metadata = NewObject::new("x", id("ROOT"));
    metadata.modified_time = Some(chrono::Utc::now());
    store.upload_new(metadata, b"x".to_vec()).await.unwrap();
}

#[tokio::test]
async fn test_update_content_uses_media_upload() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("PUT"))
        .and(path("/upload/drive/v2/files/f1"))
        .and(query_param("uploadType", "media"))
        .and(body_string_contains("hello"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(file_json("f1", "a.txt", "ROOT", Some(HELLO_MD5))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let object = store.update_content(&id("f1"), b"hello".to_vec()).await.unwrap();
    assert_eq!(object.content_hash.unwrap().as_str(), HELLO_MD5);
}

#[tokio::test]
async fn test_patch_sends_only_changed_fields() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/drive/v2/files/f1"))
        .and(body_json(json!({"title": "renamed.txt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("f1", "renamed.txt", "ROOT", None)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/drive/v2/files/f2"))
        .and(body_json(json!({"parents": [{"id": "d9"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("f2", "b.txt", "d9", None)))
        .expect(1)
        .mount(&server)
        .await;

    let patched = store
        .patch_many(vec![
            (
                id("f1"),
                MetadataPatch {
                    title: Some("renamed.txt".into()),
                    parent_id: None,
                },
            ),
            (
                id("f2"),
                MetadataPatch {
                    title: None,
                    parent_id: Some(id("d9")),
                },
            ),
        ])
        .await
        .unwrap();
    assert_eq!(patched[0].title, "renamed.txt");
    assert_eq!(patched[1].parent_id, id("d9"));
}

#[tokio::test]
async fn test_trash_many_trashes_each_object() {
    let (server, store) = common::setup_store_mock().await;
    for name in ["a", "b"] {
        Mock::given(method("POST"))
            .and(path(format!("/drive/v2/files/{name}/trash")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": name})))
            .expect(1)
            .mount(&server)
            .await;
    }

    store.trash_many(&[id("a"), id("b")]).await.unwrap();
}

#[tokio::test]
async fn test_create_directory_inserts_folder() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("POST"))
        .and(path("/drive/v2/files"))
        .and(body_json(json!({
            "title": "docs",
            "parents": [{"id": "ROOT"}],
            "mimeType": "application/vnd.google-apps.folder"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(folder_json("d1", "docs", "ROOT")))
        .expect(1)
        .mount(&server)
        .await;

    let folder = store
        .create_directory(NewObject::new("docs", id("ROOT")))
        .await
        .unwrap();
    assert!(folder.is_directory);
    assert_eq!(folder.id, id("d1"));
}

#[tokio::test]
async fn test_failed_write_carries_context() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("POST"))
        .and(path("/drive/v2/files/f1/trash"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "File not found: f1"}
        })))
        .mount(&server)
        .await;

    let err = store.trash(&id("f1")).await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to trash f1");
    assert!(format!("{err:#}").contains("File not found: f1"));
}
