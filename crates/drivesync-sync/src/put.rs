//! Upload standalone files under an explicit remote folder
//!
//! Independent of any index: the files need not live in a synchronized
//! home and nothing is recorded locally.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, instrument};

use drivesync_core::domain::{RemoteId, RemoteObject};
use drivesync_core::ports::{IRemoteStore, NewObject};

use crate::transfer::{self, fan_out, partition};
use crate::workspace::{SyncOptions, Workspace};
use crate::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutEntry {
    pub path: PathBuf,
    pub object: RemoteObject,
}

/// Upload every file in `paths` into the folder `parent_id`
#[instrument(skip(remote, paths, options), fields(files = paths.len()))]
pub async fn put_files(
    remote: &dyn IRemoteStore,
    parent_id: &RemoteId,
    paths: Vec<PathBuf>,
    options: SyncOptions,
) -> Result<Vec<PutEntry>> {
    let results = fan_out(paths, options.transfer_concurrency, |path| async move {
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SyncError::UnresolvedParent(path.clone()))?;
        let metadata = NewObject::new(title, parent_id.clone());

        let object = if options.simulation {
            RemoteObject::file(Workspace::simulated_id()?, metadata.title, metadata.parent_id, None)
        } else {
            let content = tokio::fs::read(&path)
                .await
                .map_err(SyncError::local_io(&path))?;
            transfer::upload_new_content(remote, &path, content, metadata).await?
        };
        info!(path = %path.display(), id = %object.id, "Put file");
        Ok::<_, SyncError>(PutEntry { path, object })
    })
    .await;

    let (mut done, failure) = partition(results);
    if let Some(e) = failure {
        return Err(e);
    }
    done.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(done)
}
