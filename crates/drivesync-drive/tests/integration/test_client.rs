//! DriveClient retry, refresh and error classification

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, ResponseTemplate};

use drivesync_drive::DriveError;

use crate::common::{self, StaticRefresher};

fn about_body() -> serde_json::Value {
    json!({"largestChangeId": "100", "rootFolderId": "ROOT"})
}

#[tokio::test]
async fn test_about_sends_bearer_token() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .and(bearer_token("test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(about_body()))
        .expect(1)
        .mount(&server)
        .await;

    let about = client.about().await.expect("about failed");
    assert_eq!(about.largest_change_id, 100);
    assert_eq!(about.root_folder_id, "ROOT");
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(about_body()))
        .mount(&server)
        .await;

    let about = client.about().await.expect("retry should succeed");
    assert_eq!(about.largest_change_id, 100);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_throttling_honours_retry_after() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(about_body()))
        .mount(&server)
        .await;

    assert!(client.about().await.is_ok());
}

#[tokio::test]
async fn test_retry_limit_is_enforced() {
    let (server, client) = common::setup_drive_mock().await;
    let client = client.with_max_retries(2);

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": 500, "message": "Backend Error"}
        })))
        .expect(3)
        .mount(&server)
        .await;

    let err = client.about().await.unwrap_err();
    match err {
        DriveError::ServerError { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Backend Error");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_throttling_exhausted_reports_too_many_requests() {
    let (server, client) = common::setup_drive_mock().await;
    let client = client.with_max_retries(0);

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "3"))
        .mount(&server)
        .await;

    let err = client.about().await.unwrap_err();
    assert!(matches!(
        err,
        DriveError::TooManyRequests { retry_after } if retry_after.as_secs() == 3
    ));
}

#[tokio::test]
async fn test_unauthorized_triggers_single_refresh() {
    let (server, client) = common::setup_drive_mock().await;
    let refresher = Arc::new(StaticRefresher::new("fresh-token"));
    let client = client.with_refresher(refresher.clone());

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .and(bearer_token("test-access-token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .and(bearer_token("fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(about_body()))
        .expect(2)
        .mount(&server)
        .await;

    client.about().await.expect("refreshed request should succeed");
    client.about().await.expect("second request uses the new token");
    assert_eq!(refresher.calls(), 1);
    assert_eq!(client.access_token().await, "fresh-token");
}

#[tokio::test]
async fn test_unauthorized_without_refresher_fails() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "Invalid Credentials"}
        })))
        .mount(&server)
        .await;

    let err = client.about().await.unwrap_err();
    assert!(matches!(err, DriveError::Unauthorized(m) if m == "Invalid Credentials"));
}

#[tokio::test]
async fn test_repeated_unauthorized_is_not_refreshed_twice() {
    let (server, client) = common::setup_drive_mock().await;
    let refresher = Arc::new(StaticRefresher::new("still-bad"));
    let client = client.with_refresher(refresher.clone());

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    assert!(matches!(
        client.about().await,
        Err(DriveError::Unauthorized(_))
    ));
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_not_found_is_classified() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/files/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "File not found: missing"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = drivesync_core::domain::RemoteId::new("missing").unwrap();
    let err = client.get_file(&id).await.unwrap_err();
    assert!(matches!(err, DriveError::NotFound(m) if m == "File not found: missing"));
    assert!(!DriveError::NotFound(String::new()).is_transient());
}

#[tokio::test]
async fn test_malformed_json_is_invalid_response() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v2/about"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    assert!(matches!(
        client.about().await,
        Err(DriveError::InvalidResponse(_))
    ));
}
