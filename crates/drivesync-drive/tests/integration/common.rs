//! Shared test helpers for Drive API integration tests
//!
//! Provides wiremock-based mock server setup and JSON builders for Drive
//! file resources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivesync_core::ports::Tokens;
use drivesync_drive::{DriveClient, DriveRemoteStore, TokenRefresher};

/// MD5 of `b"hello"`
pub const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

/// Starts a mock server and returns a client pointing at it with a fast
/// retry schedule.
pub async fn setup_drive_mock() -> (MockServer, DriveClient) {
    let server = MockServer::start().await;
    let client = DriveClient::with_base_url("test-access-token", server.uri())
        .with_retry_base(Duration::from_millis(1));
    (server, client)
}

/// Same as [`setup_drive_mock`] wrapped in the remote store
pub async fn setup_store_mock() -> (MockServer, DriveRemoteStore) {
    let (server, client) = setup_drive_mock().await;
    (server, DriveRemoteStore::new(client).with_concurrency(4))
}

/// A file resource as the API returns it
pub fn file_json(id: &str, title: &str, parent: &str, md5: Option<&str>) -> Value {
    let mut file = json!({
        "id": id,
        "title": title,
        "parents": [{"id": parent}],
        "mimeType": "text/plain",
        "modifiedDate": "2024-05-01T12:00:00.000Z",
        "labels": {"trashed": false}
    });
    if let Some(md5) = md5 {
        file["md5Checksum"] = json!(md5);
    }
    file
}

/// A folder resource as the API returns it
pub fn folder_json(id: &str, title: &str, parent: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "parents": [{"id": parent}],
        "mimeType": "application/vnd.google-apps.folder",
        "modifiedDate": "2024-05-01T12:00:00.000Z",
        "labels": {"trashed": false}
    })
}

/// Mounts `GET /files/{id}` (metadata, no `alt`) returning `file`
pub async fn mount_file_metadata(server: &MockServer, id: &str, file: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/v2/files/{id}")))
        .and(wiremock::matchers::query_param_is_missing("alt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file))
        .mount(server)
        .await;
}

/// Mounts `GET /files/{id}?alt=media` returning `content`
pub async fn mount_media(server: &MockServer, id: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/v2/files/{id}")))
        .and(wiremock::matchers::query_param("alt", "media"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}

/// Refresher handing out a fixed token and counting its calls
pub struct StaticRefresher {
    token: String,
    calls: AtomicUsize,
}

impl StaticRefresher {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(&self, tokens: &Tokens) -> anyhow::Result<Tokens> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Tokens {
            access_token: self.token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}
