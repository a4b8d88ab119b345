//! Google Drive v2 HTTP client
//!
//! Provides a typed HTTP client for the Drive v2 REST API. Handles the
//! bearer token, JSON (de)serialization, endpoint construction and the
//! retry policy shared by every request.
//!
//! ## Retry policy
//!
//! - 429 and 5xx responses, connection failures and timeouts are retried up
//!   to `max_retries` times, waiting for the `Retry-After` delay when the
//!   service sends one and exponential backoff otherwise.
//! - A 401 triggers one token refresh (when a [`TokenRefresher`] is
//!   attached) followed by a single repeat of the request.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivesync_drive::client::DriveClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DriveClient::with_base_url("access-token", "https://www.googleapis.com");
//! let about = client.about().await?;
//! println!("root folder: {}", about.root_folder_id);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hyper::body::Bytes;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use drivesync_core::config::HttpConfig;
use drivesync_core::domain::RemoteId;
use drivesync_core::ports::Tokens;

use crate::auth::TokenRefresher;
use crate::model::{About, ChangeList, DriveFile, ErrorEnvelope, FileList, FileMetadata, FILE_FIELDS};
use crate::DriveError;

/// Public endpoint of the Google APIs
const GOOGLE_APIS_URL: &str = "https://www.googleapis.com";

/// Path prefix of metadata requests
const API_PATH: &str = "/drive/v2";

/// Path prefix of content uploads
const UPLOAD_PATH: &str = "/upload/drive/v2";

/// Page size for file listings
const LIST_PAGE_SIZE: u32 = 400;

/// Page size for the change feed
const CHANGES_PAGE_SIZE: u32 = 1000;

/// First backoff step when the service gives no `Retry-After`
const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);

/// Upper bound of a single backoff step
const MAX_BACKOFF: Duration = Duration::from_secs(32);

/// Tokens closer than this (in seconds) to expiry are refreshed before use
const REFRESH_MARGIN_SECS: i64 = 60;

// ============================================================================
// DriveClient
// ============================================================================

/// Authenticated HTTP client for the Drive v2 API
pub struct DriveClient {
    /// The underlying HTTP client
    client: Client,
    /// Scheme and host every API path is appended to
    base_url: String,
    /// Current OAuth tokens
    tokens: RwLock<Tokens>,
    /// Refreshes expired access tokens; without one a 401 is final
    refresher: Option<Arc<dyn TokenRefresher>>,
    max_retries: u32,
    retry_base: Duration,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("refresher", &self.refresher.is_some())
            .finish_non_exhaustive()
    }
}

impl DriveClient {
    /// Creates a client against the public Google APIs endpoint
    pub fn new(tokens: Tokens, http: &HttpConfig) -> Result<Self, DriveError> {
        let client = Client::builder()
            .connect_timeout(http.connect_timeout())
            .read_timeout(http.read_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: GOOGLE_APIS_URL.to_string(),
            tokens: RwLock::new(tokens),
            refresher: None,
            max_retries: http.max_retries,
            retry_base: DEFAULT_RETRY_BASE,
        })
    }

    /// Creates a client with a fixed access token and a custom base URL
    /// (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: RwLock::new(Tokens {
                access_token: access_token.into(),
                refresh_token: None,
                expires_at: Utc::now() + chrono::Duration::days(365),
            }),
            refresher: None,
            max_retries: HttpConfig::default().max_retries,
            retry_base: DEFAULT_RETRY_BASE,
        }
    }

    /// Attaches a token refresher used on expiry and on 401 responses
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the first backoff step (doubled on every further attempt)
    #[must_use]
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Returns the current access token
    pub async fn access_token(&self) -> String {
        self.tokens.read().await.access_token.clone()
    }

    /// Returns a copy of the current tokens (e.g. to persist after a refresh)
    pub async fn tokens(&self) -> Tokens {
        self.tokens.read().await.clone()
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PATH, path)
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, UPLOAD_PATH, path)
    }

    // ========================================================================
    // Request execution
    // ========================================================================

    /// Sends the request produced by `build`, applying authentication and
    /// the retry policy. `build` runs once per attempt.
    pub async fn execute<F>(&self, what: &str, build: F) -> Result<Response, DriveError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            let token = self.fresh_token().await?;
            debug!(what, attempt, "Sending request");

            let response = match build(&self.client).bearer_auth(&token).send().await {
                Ok(response) => response,
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(what, attempt, error = %e, delay_ms = delay.as_millis(), "Transport error, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.is_success() {
                if attempt > 0 {
                    info!(what, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && !refreshed && self.refresher.is_some() {
                info!(what, "Access token rejected, refreshing");
                self.refresh(&token).await?;
                refreshed = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let delay = retry_after(&response).unwrap_or_else(|| self.backoff(attempt));
                if attempt < self.max_retries {
                    info!(
                        what,
                        status = status.as_u16(),
                        attempt,
                        retry_after_ms = delay.as_millis(),
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                warn!(what, attempts = attempt + 1, "Retry limit exhausted");
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(DriveError::TooManyRequests { retry_after: delay });
                }
            }

            return Err(error_from_response(response).await);
        }
    }

    /// Exponential backoff for the given (zero-based) attempt
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }

    /// Current access token, refreshed first when it is about to expire
    async fn fresh_token(&self) -> Result<String, DriveError> {
        let (token, expiring) = {
            let tokens = self.tokens.read().await;
            (tokens.access_token.clone(), tokens.expires_within(chrono::Duration::seconds(REFRESH_MARGIN_SECS)))
        };
        if expiring && self.refresher.is_some() {
            self.refresh(&token).await?;
            return Ok(self.access_token().await);
        }
        Ok(token)
    }

    /// Replaces `stale` with a refreshed token. Concurrent callers holding
    /// the same stale token trigger a single refresh.
    async fn refresh(&self, stale: &str) -> Result<(), DriveError> {
        let Some(refresher) = &self.refresher else {
            return Err(DriveError::Unauthorized(
                "access token expired and no refresher is configured".into(),
            ));
        };
        let mut tokens = self.tokens.write().await;
        if tokens.access_token != stale {
            return Ok(());
        }
        let renewed = refresher
            .refresh(&tokens)
            .await
            .map_err(|e| DriveError::Unauthorized(format!("{e:#}")))?;
        *tokens = renewed;
        debug!("Updated access token");
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, DriveError> {
        let response = self
            .execute(what, |c| c.get(url).query(query))
            .await?;
        read_json(response).await
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    /// `GET /about`: root folder id and largest change id
    pub async fn about(&self) -> Result<About, DriveError> {
        self.get_json(
            "about",
            &self.api_url("/about"),
            &[("fields", "largestChangeId,rootFolderId".to_string())],
        )
        .await
    }

    /// `GET /changes`: one page of the change feed starting at `start_change_id`
    pub async fn changes_page(
        &self,
        start_change_id: i64,
        page_token: Option<&str>,
    ) -> Result<ChangeList, DriveError> {
        let mut query = vec![
            ("startChangeId", start_change_id.to_string()),
            ("includeDeleted", "true".to_string()),
            ("maxResults", CHANGES_PAGE_SIZE.to_string()),
            (
                "fields",
                format!("largestChangeId,nextPageToken,items(deleted,fileId,file({FILE_FIELDS}))"),
            ),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        self.get_json("changes", &self.api_url("/changes"), &query).await
    }

    /// `GET /files`: one page of the listing matching `q`
    pub async fn files_page(&self, q: &str, page_token: Option<&str>) -> Result<FileList, DriveError> {
        let mut query = vec![
            ("q", q.to_string()),
            ("maxResults", LIST_PAGE_SIZE.to_string()),
            ("fields", format!("nextPageToken,items({FILE_FIELDS})")),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        self.get_json("files.list", &self.api_url("/files"), &query).await
    }

    /// `GET /files/{id}`
    pub async fn get_file(&self, id: &RemoteId) -> Result<DriveFile, DriveError> {
        self.get_json(
            "files.get",
            &self.api_url(&format!("/files/{id}")),
            &[("fields", FILE_FIELDS.to_string())],
        )
        .await
    }

    /// `GET /files/{id}?alt=media`: the raw content response, body unread
    pub async fn download(&self, id: &RemoteId) -> Result<Response, DriveError> {
        let url = self.api_url(&format!("/files/{id}"));
        self.execute("files.download", |c| c.get(&url).query(&[("alt", "media")]))
            .await
    }

    /// `POST /upload/files?uploadType=multipart`: create a file with content
    pub async fn insert_file(
        &self,
        metadata: &FileMetadata,
        content: Bytes,
    ) -> Result<DriveFile, DriveError> {
        let (content_type, body) = multipart_related(metadata, &content)?;
        let url = self.upload_url("/files");
        let mut query = vec![
            ("uploadType", "multipart".to_string()),
            ("fields", FILE_FIELDS.to_string()),
        ];
        if metadata.modified_date.is_some() {
            query.push(("setModifiedDate", "true".to_string()));
        }
        let response = self
            .execute("files.insert", |c| {
                c.post(&url)
                    .query(&query)
                    .header(header::CONTENT_TYPE, content_type.as_str())
                    .body(body.clone())
            })
            .await?;
        read_json(response).await
    }

    /// `PUT /upload/files/{id}?uploadType=media`: replace the content
    pub async fn update_content(&self, id: &RemoteId, content: Bytes) -> Result<DriveFile, DriveError> {
        let url = self.upload_url(&format!("/files/{id}"));
        let response = self
            .execute("files.update", |c| {
                c.put(&url)
                    .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .body(content.clone())
            })
            .await?;
        read_json(response).await
    }

    /// `PATCH /files/{id}`: update only the fields set in `metadata`
    pub async fn patch(&self, id: &RemoteId, metadata: &FileMetadata) -> Result<DriveFile, DriveError> {
        let url = self.api_url(&format!("/files/{id}"));
        let response = self
            .execute("files.patch", |c| {
                c.request(Method::PATCH, &url)
                    .query(&[("fields", FILE_FIELDS)])
                    .json(metadata)
            })
            .await?;
        read_json(response).await
    }

    /// `POST /files`: metadata-only insert (folders)
    pub async fn insert_metadata(&self, metadata: &FileMetadata) -> Result<DriveFile, DriveError> {
        let url = self.api_url("/files");
        let response = self
            .execute("files.insert", |c| {
                c.post(&url).query(&[("fields", FILE_FIELDS)]).json(metadata)
            })
            .await?;
        read_json(response).await
    }

    /// `POST /files/{id}/trash`
    pub async fn trash(&self, id: &RemoteId) -> Result<(), DriveError> {
        let url = self.api_url(&format!("/files/{id}/trash"));
        self.execute("files.trash", |c| c.post(&url).query(&[("fields", "id")]))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, DriveError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| DriveError::InvalidResponse(e.to_string()))
}

async fn error_from_response(response: Response) -> DriveError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|envelope| envelope.error.message)
        .unwrap_or(text);
    DriveError::from_status(status, message)
}

/// Delay requested by a `Retry-After` header given in seconds
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// `multipart/related` body with a JSON metadata part and the content part
fn multipart_related(metadata: &FileMetadata, content: &[u8]) -> Result<(String, Bytes), DriveError> {
    let boundary = format!("drivesync-{}", uuid::Uuid::new_v4().simple());
    let json = serde_json::to_vec(metadata).map_err(|e| DriveError::InvalidResponse(e.to_string()))?;

    let mut body = Vec::with_capacity(json.len() + content.len() + 4 * boundary.len() + 128);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(&json);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Ok((format!("multipart/related; boundary={boundary}"), Bytes::from(body)))
}
