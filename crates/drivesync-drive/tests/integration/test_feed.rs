//! Change feed accumulation and listing pagination

use futures_util::TryStreamExt;
use serde_json::json;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use drivesync_core::domain::RemoteObject;
use drivesync_core::ports::{IRemoteStore, ObjectKind};
use drivesync_drive::feed;

use crate::common::{self, file_json, folder_json};

#[tokio::test]
async fn test_changes_follow_page_tokens() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/changes"))
        .and(query_param("startChangeId", "8"))
        .and(query_param("includeDeleted", "true"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "largestChangeId": "12",
            "nextPageToken": "p2",
            "items": [
                {"fileId": "f1", "deleted": false, "file": file_json("f1", "a.txt", "ROOT", None)},
                {"fileId": "gone", "deleted": true}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v2/changes"))
        .and(query_param("startChangeId", "8"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "largestChangeId": "12",
            "items": [
                {"fileId": "d1", "file": folder_json("d1", "docs", "ROOT")}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let set = feed::collect_changes(&client, 7).await.expect("changes failed");
    assert_eq!(set.largest_revision_id, 12);
    assert_eq!(set.changes.len(), 3);
    assert_eq!(set.removed_ids().len(), 1);
    assert_eq!(set.modified_dirs().count(), 1);
    assert_eq!(set.modified_files().count(), 1);
}

#[tokio::test]
async fn test_empty_feed_keeps_revision() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let set = feed::collect_changes(&client, 41).await.unwrap();
    assert!(set.is_empty());
    assert_eq!(set.largest_revision_id, 41);
}

#[tokio::test]
async fn test_listing_streams_every_page() {
    let (server, store) = common::setup_store_mock().await;
    let files_query = feed::list_query(ObjectKind::Files);

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param("q", files_query.as_str()))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "next",
            "items": [file_json("f1", "a.txt", "ROOT", None), file_json("f2", "b.txt", "d1", None)]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param("q", files_query.as_str()))
        .and(query_param("pageToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "",
            "items": [file_json("f3", "c.txt", "ROOT", None)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pages: Vec<Vec<RemoteObject>> = store
        .list_objects(ObjectKind::Files)
        .try_collect()
        .await
        .expect("listing failed");

    assert_eq!(pages.len(), 2);
    let titles: Vec<&str> = pages.iter().flatten().map(|o| o.title.as_str()).collect();
    assert_eq!(titles, vec!["a.txt", "b.txt", "c.txt"]);
}

#[tokio::test]
async fn test_listing_directories_uses_folder_query() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .and(query_param("q", feed::list_query(ObjectKind::Directories).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [folder_json("d1", "docs", "ROOT")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pages: Vec<Vec<RemoteObject>> =
        store.list_objects(ObjectKind::Directories).try_collect().await.unwrap();
    assert_eq!(pages.len(), 1);
    assert!(pages[0][0].is_directory);
}

#[tokio::test]
async fn test_listing_error_surfaces_in_stream() {
    let (server, store) = common::setup_store_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Insufficient Permission"}
        })))
        .mount(&server)
        .await;

    let result: anyhow::Result<Vec<Vec<RemoteObject>>> =
        store.list_objects(ObjectKind::Files).try_collect().await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("Insufficient Permission"));
}
