//! DriveRemoteStore - IRemoteStore implementation for Google Drive
//!
//! Wraps the [`DriveClient`] and delegates to the client and feed modules
//! to fulfil the [`IRemoteStore`] port contract.
//!
//! ## Design Notes
//!
//! - Batched variants issue one request per object with bounded
//!   concurrency instead of using the multipart batch endpoint.
//! - `download_content` fetches the object's metadata first; the media
//!   response itself carries no MD5 checksum.
//! - Token refresh happens inside the client; this type never sees a 401.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use hyper::body::Bytes;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use drivesync_core::config::Config;
use drivesync_core::domain::{RemoteChangeSet, RemoteId, RemoteObject};
use drivesync_core::ports::{
    AboutInfo, Download, IRemoteStore, MetadataPatch, NewObject, ObjectKind, ObjectPages,
};

use crate::auth::{OAuth2Config, OAuthRefresher, TokenStore};
use crate::client::DriveClient;
use crate::feed;
use crate::model::FileMetadata;
use crate::DriveError;

/// Requests in flight per batched call unless configured otherwise
const DEFAULT_CONCURRENCY: usize = 8;

/// Remote store backed by the Drive v2 API
#[derive(Debug, Clone)]
pub struct DriveRemoteStore {
    client: Arc<DriveClient>,
    concurrency: usize,
}

impl DriveRemoteStore {
    pub fn new(client: DriveClient) -> Self {
        Self {
            client: Arc::new(client),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Connect with the credentials stored at `credentials`.
    ///
    /// Expired tokens are refreshed (and written back) when the `auth`
    /// section names an OAuth client.
    pub fn connect(config: &Config, credentials: &Path) -> Result<Self> {
        let store = TokenStore::new(credentials);
        let tokens = store.load()?.ok_or_else(|| {
            DriveError::NotLoggedIn(format!(
                "no credentials at {}; run `drivesync login`",
                credentials.display()
            ))
        })?;

        let mut client = DriveClient::new(tokens, &config.http)?;
        match OAuth2Config::from_config(&config.auth) {
            Ok(oauth) => {
                let refresher = OAuthRefresher::new(&oauth, Some(store))?;
                client = client.with_refresher(Arc::new(refresher));
            }
            Err(e) => warn!(error = %e, "Token refresh disabled"),
        }

        info!("Connected to Google Drive");
        Ok(Self::new(client).with_concurrency(config.sync.transfer_concurrency))
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }
}

#[async_trait]
impl IRemoteStore for DriveRemoteStore {
    async fn about(&self) -> Result<AboutInfo> {
        let about = self.client.about().await.context("Failed to read drive info")?;
        Ok(AboutInfo {
            root_id: RemoteId::new(about.root_folder_id)?,
            largest_revision_id: about.largest_change_id,
        })
    }

    fn list_objects(&self, kind: ObjectKind) -> ObjectPages<'_> {
        feed::object_pages(&self.client, kind)
    }

    async fn get_changes(&self, since_revision: i64) -> Result<RemoteChangeSet> {
        feed::collect_changes(&self.client, since_revision)
            .await
            .with_context(|| format!("Failed to fetch changes after revision {since_revision}"))
    }

    async fn get_object(&self, id: &RemoteId) -> Result<RemoteObject> {
        let file = self
            .client
            .get_file(id)
            .await
            .with_context(|| format!("Failed to get metadata of {id}"))?;
        Ok(RemoteObject::try_from(file)?)
    }

    async fn get_objects(&self, ids: &[RemoteId]) -> Result<Vec<RemoteObject>> {
        debug!(count = ids.len(), "Fetching metadata batch");
        stream::iter(ids.iter().cloned())
            .map(|id| async move { self.get_object(&id).await })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    async fn download_content(&self, id: &RemoteId) -> Result<Download> {
        let object = self.get_object(id).await?;
        let response = self
            .client
            .download(id)
            .await
            .with_context(|| format!("Failed to download {id}"))?;

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Download {
            content: Box::new(StreamReader::new(Box::pin(body))),
            content_hash: object.content_hash,
        })
    }

    async fn upload_new(&self, metadata: NewObject, content: Vec<u8>) -> Result<RemoteObject> {
        let file = self
            .client
            .insert_file(&FileMetadata::from(&metadata), Bytes::from(content))
            .await
            .with_context(|| format!("Failed to upload {}", metadata.title))?;
        Ok(RemoteObject::try_from(file)?)
    }

    async fn update_content(&self, id: &RemoteId, content: Vec<u8>) -> Result<RemoteObject> {
        let file = self
            .client
            .update_content(id, Bytes::from(content))
            .await
            .with_context(|| format!("Failed to update content of {id}"))?;
        Ok(RemoteObject::try_from(file)?)
    }

    async fn patch_metadata(&self, id: &RemoteId, patch: MetadataPatch) -> Result<RemoteObject> {
        let file = self
            .client
            .patch(id, &FileMetadata::from(&patch))
            .await
            .with_context(|| format!("Failed to update metadata of {id}"))?;
        Ok(RemoteObject::try_from(file)?)
    }

    async fn patch_many(&self, patches: Vec<(RemoteId, MetadataPatch)>) -> Result<Vec<RemoteObject>> {
        debug!(count = patches.len(), "Patching metadata batch");
        stream::iter(patches)
            .map(|(id, patch)| async move { self.patch_metadata(&id, patch).await })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    async fn trash(&self, id: &RemoteId) -> Result<()> {
        self.client
            .trash(id)
            .await
            .with_context(|| format!("Failed to trash {id}"))
    }

    async fn trash_many(&self, ids: &[RemoteId]) -> Result<()> {
        debug!(count = ids.len(), "Trashing batch");
        stream::iter(ids.iter().cloned())
            .map(|id| async move { self.trash(&id).await })
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    async fn create_directory(&self, metadata: NewObject) -> Result<RemoteObject> {
        let file = self
            .client
            .insert_metadata(&FileMetadata::folder(&metadata))
            .await
            .with_context(|| format!("Failed to create folder {}", metadata.title))?;
        Ok(RemoteObject::try_from(file)?)
    }
}
