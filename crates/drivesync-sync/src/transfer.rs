//! Verified content transfers
//!
//! Downloads stream through a [`ChecksumReader`] into the staging directory
//! and are checked against the remote checksum before anything is moved into
//! the home. Uploads compare the checksum the service reports back with the
//! hash of the bytes that were sent. Independent transfers run concurrently
//! up to the configured limit; the caller folds the results in afterwards.

use std::future::Future;
use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use drivesync_core::domain::{ContentHash, RemoteId, RemoteObject};
use drivesync_core::ports::{IRemoteStore, NewObject};

use crate::checksum::{hash_bytes, ChecksumReader};
use crate::filesystem::LocalFileSystem;
use crate::workspace::Workspace;
use crate::{Result, SyncError};

/// A remote file fetched into the staging directory and verified
#[derive(Debug, Clone)]
pub struct StagedDownload {
    pub object: RemoteObject,
    /// Home-relative destination
    pub target: PathBuf,
    /// Absolute path of the verified staged copy
    pub staged: PathBuf,
}

/// Run `f` over `items` with at most `limit` in flight, keeping every result
pub(crate) async fn fan_out<T, O, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<Result<O>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<O>>,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}

/// Split fan-out results into successes and the first failure
pub(crate) fn partition<O>(results: Vec<Result<O>>) -> (Vec<O>, Option<SyncError>) {
    let mut ok = Vec::with_capacity(results.len());
    let mut first_err = None;
    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                } else {
                    warn!(error = %e, "Additional transfer failure");
                }
            }
        }
    }
    (ok, first_err)
}

// ============================================================================
// Downloads
// ============================================================================

/// Download one object into `tmp_dir`, verify it, stamp its mtime
#[instrument(skip(remote, tmp_dir, object), fields(id = %object.id, path = %target.display()))]
pub async fn download_verified(
    remote: &dyn IRemoteStore,
    tmp_dir: &Path,
    object: &RemoteObject,
    target: &Path,
) -> Result<PathBuf> {
    let download = remote
        .download_content(&object.id)
        .await
        .map_err(SyncError::Remote)?;
    let reported = download.content_hash;
    let content = download.content;
    let staged = tmp_dir.join(format!("{}-{}", object.id, Uuid::new_v4()));

    let written = async {
        let mut file = tokio::fs::File::create(&staged).await?;
        let mut reader = ChecksumReader::new(content);
        tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok::<_, std::io::Error>(reader.finalize())
    }
    .await;

    let actual = match written {
        Ok(hash) => hash,
        Err(e) => {
            discard(&staged).await;
            return Err(SyncError::local_io(&staged)(e));
        }
    };

    for expected in [&object.content_hash, &reported]
        .into_iter()
        .flatten()
    {
        if *expected != actual {
            discard(&staged).await;
            return Err(SyncError::ChecksumMismatch {
                path: target.to_path_buf(),
                id: object.id.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    LocalFileSystem::set_modified(&staged, object.modified_time).await?;
    debug!(hash = %actual, "Downloaded and verified");
    Ok(staged)
}

/// Download every `(object, target)` pair concurrently.
///
/// On failure the staged copies that did succeed are removed and the first
/// error is returned; nothing is moved into the home here.
pub async fn download_all(
    ws: &Workspace,
    items: Vec<(RemoteObject, PathBuf)>,
) -> Result<Vec<StagedDownload>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let tmp_dir = ws.store().tmp_dir()?;
    let remote = ws.remote();
    let tmp = tmp_dir.as_path();

    let results = fan_out(items, ws.options().transfer_concurrency, |(object, target)| async move {
        let staged = download_verified(remote, tmp, &object, &target).await?;
        Ok::<_, SyncError>(StagedDownload {
            object,
            target,
            staged,
        })
    })
    .await;

    let (staged, failure) = partition(results);
    if let Some(e) = failure {
        for download in &staged {
            discard(&download.staged).await;
        }
        return Err(e);
    }
    Ok(staged)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Could not remove staged file");
    }
}

// ============================================================================
// Uploads
// ============================================================================

/// Replace the content of an existing remote file with a local file
#[instrument(skip(remote, fs), fields(path = %path.display(), id = %id))]
pub async fn upload_update(
    remote: &dyn IRemoteStore,
    fs: &LocalFileSystem,
    path: &Path,
    id: &RemoteId,
) -> Result<RemoteObject> {
    let content = fs.read(path).await?;
    let local = hash_bytes(&content);
    let object = remote
        .update_content(id, content)
        .await
        .map_err(SyncError::Remote)?;
    verify_upload(path, &object, local)?;
    Ok(object)
}

/// Create a remote file from a local file
#[instrument(skip(remote, fs, metadata), fields(path = %path.display(), parent = %metadata.parent_id))]
pub async fn upload_new(
    remote: &dyn IRemoteStore,
    fs: &LocalFileSystem,
    path: &Path,
    metadata: NewObject,
) -> Result<RemoteObject> {
    let content = fs.read(path).await?;
    upload_new_content(remote, path, content, metadata).await
}

/// Create a remote file from bytes already in memory; `path` names the
/// source in errors
pub async fn upload_new_content(
    remote: &dyn IRemoteStore,
    path: &Path,
    content: Vec<u8>,
    metadata: NewObject,
) -> Result<RemoteObject> {
    let local = hash_bytes(&content);
    let object = remote
        .upload_new(metadata, content)
        .await
        .map_err(SyncError::Remote)?;
    verify_upload(path, &object, local)?;
    Ok(object)
}

fn verify_upload(path: &Path, object: &RemoteObject, local: ContentHash) -> Result<()> {
    match &object.content_hash {
        Some(remote) if *remote != local => Err(SyncError::ChecksumMismatch {
            path: path.to_path_buf(),
            id: object.id.clone(),
            expected: local,
            actual: remote.clone(),
        }),
        Some(_) => {
            debug!(id = %object.id, "Upload verified");
            Ok(())
        }
        None => {
            warn!(id = %object.id, path = %path.display(), "Remote reported no checksum for upload");
            Ok(())
        }
    }
}
