//! drivesync Drive - Google Drive v2 REST adapter
//!
//! Provides an async client for:
//! - OAuth2 authentication (Authorization Code with PKCE, loopback redirect)
//! - File and folder operations via the Drive v2 API
//! - The revision-ordered change feed and paged listings
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 PKCE login flow, token refresh and credential storage
//! - [`client`] - authenticated HTTP client with retry and token refresh
//! - [`model`] - Drive wire types and their conversion to domain objects
//! - [`feed`] - change feed and listing pagination
//! - [`provider`] - [`IRemoteStore`](drivesync_core::ports::IRemoteStore) implementation

pub mod auth;
pub mod client;
pub mod feed;
pub mod model;
pub mod provider;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub use auth::{DriveAuthAdapter, OAuth2Config, OAuthRefresher, TokenRefresher, TokenStore};
pub use client::DriveClient;
pub use provider::DriveRemoteStore;

/// Errors that can occur when communicating with the Drive API
#[derive(Debug, Error)]
pub enum DriveError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded and retries exhausted
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Delay the service asked for on the last attempt
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx) and retries were exhausted
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Any other non-success status
    #[error("Request failed with {status}: {message}")]
    Api { status: u16, message: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// No usable credentials; `login` has to run first
    #[error("Not logged in: {0}")]
    NotLoggedIn(String),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl DriveError {
    /// Classify a non-success response by status code
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(message),
            StatusCode::FORBIDDEN => Self::Forbidden(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            s if s.is_server_error() => Self::ServerError {
                status: s.as_u16(),
                message,
            },
            s => Self::Api {
                status: s.as_u16(),
                message,
            },
        }
    }

    /// Whether the request may succeed when repeated unchanged
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TooManyRequests { .. } | Self::ServerError { .. } | Self::Network(_)
        )
    }
}
