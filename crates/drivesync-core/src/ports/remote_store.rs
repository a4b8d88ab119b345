//! Remote store port (driven/secondary port)
//!
//! This module defines the interface the reconcilers use to talk to the
//! remote object store. The production implementation targets Google Drive
//! (`drivesync-drive`); tests use an in-memory store.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and don't need domain-level classification.
//! - Uses `#[async_trait]` for async trait methods.
//! - Batched variants (`get_objects`, `patch_many`, `trash_many`) have
//!   sequential default implementations; adapters override them to fan out.

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::domain::{ContentHash, RemoteChangeSet, RemoteId, RemoteObject};

// ============================================================================
// Tokens
// ============================================================================

/// OAuth tokens used to authorize requests against the remote store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for refreshing the access token without user interaction
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

// ============================================================================
// Request / response DTOs
// ============================================================================

/// Drive-wide facts needed to seed an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AboutInfo {
    /// Concrete id of the root folder (what `"root"` aliases)
    pub root_id: RemoteId,
    /// Largest revision of the change feed at the time of the call
    pub largest_revision_id: i64,
}

/// Which objects a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Files,
    Directories,
}

/// Metadata for an object about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObject {
    pub title: String,
    pub parent_id: RemoteId,
    pub modified_time: Option<DateTime<Utc>>,
}

impl NewObject {
    pub fn new(title: impl Into<String>, parent_id: RemoteId) -> Self {
        Self {
            title: title.into(),
            parent_id,
            modified_time: None,
        }
    }
}

/// Partial metadata update; only the fields that are `Some` are sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataPatch {
    pub title: Option<String>,
    /// New parent. The old parent is replaced, not kept alongside.
    pub parent_id: Option<RemoteId>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.parent_id.is_none()
    }
}

/// Streamed content of a remote file
pub struct Download {
    pub content: Box<dyn AsyncRead + Send + Unpin>,
    /// Checksum the service reports for the content, if any
    pub content_hash: Option<ContentHash>,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Lazily fetched pages of a listing
pub type ObjectPages<'a> = BoxStream<'a, anyhow::Result<Vec<RemoteObject>>>;

// ============================================================================
// IRemoteStore trait
// ============================================================================

/// Port trait for remote object store operations
///
/// ## Implementation Notes
///
/// - Implementations handle retries of transient errors internally.
/// - All methods assume valid credentials are available; token refresh is
///   the implementation's concern.
/// - Mutating methods return the object's metadata after the change so the
///   caller can fold it into the index without another round trip.
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Root folder id and current largest revision
    async fn about(&self) -> anyhow::Result<AboutInfo>;

    /// Current largest revision of the change feed
    async fn current_largest_revision(&self) -> anyhow::Result<i64> {
        Ok(self.about().await?.largest_revision_id)
    }

    /// Every non-trashed object of the given kind, one page per item
    fn list_objects(&self, kind: ObjectKind) -> ObjectPages<'_>;

    /// All change events after `since_revision`, accumulated across pages
    async fn get_changes(&self, since_revision: i64) -> anyhow::Result<RemoteChangeSet>;

    /// Metadata of a single object
    async fn get_object(&self, id: &RemoteId) -> anyhow::Result<RemoteObject>;

    /// Metadata of many objects
    async fn get_objects(&self, ids: &[RemoteId]) -> anyhow::Result<Vec<RemoteObject>> {
        let mut objects = Vec::with_capacity(ids.len());
        for id in ids {
            objects.push(self.get_object(id).await?);
        }
        Ok(objects)
    }

    /// Stream the content of a file
    async fn download_content(&self, id: &RemoteId) -> anyhow::Result<Download>;

    /// Create a new file with the given content
    async fn upload_new(&self, metadata: NewObject, content: Vec<u8>)
        -> anyhow::Result<RemoteObject>;

    /// Replace the content of an existing file
    async fn update_content(&self, id: &RemoteId, content: Vec<u8>)
        -> anyhow::Result<RemoteObject>;

    /// Apply a partial metadata update
    async fn patch_metadata(
        &self,
        id: &RemoteId,
        patch: MetadataPatch,
    ) -> anyhow::Result<RemoteObject>;

    /// Apply many partial metadata updates
    async fn patch_many(
        &self,
        patches: Vec<(RemoteId, MetadataPatch)>,
    ) -> anyhow::Result<Vec<RemoteObject>> {
        let mut objects = Vec::with_capacity(patches.len());
        for (id, patch) in patches {
            objects.push(self.patch_metadata(&id, patch).await?);
        }
        Ok(objects)
    }

    /// Move an object to the trash
    async fn trash(&self, id: &RemoteId) -> anyhow::Result<()>;

    /// Move many objects to the trash
    async fn trash_many(&self, ids: &[RemoteId]) -> anyhow::Result<()> {
        for id in ids {
            self.trash(id).await?;
        }
        Ok(())
    }

    /// Create a folder
    async fn create_directory(&self, metadata: NewObject) -> anyhow::Result<RemoteObject>;
}
