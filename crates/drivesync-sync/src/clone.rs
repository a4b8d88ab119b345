//! Initial clone of a drive into an empty home
//!
//! Seeds the index from the drive's root id and current revision, indexes
//! every remote directory in one batch (so arbitrary listing order resolves
//! through placeholders), then walks the file listing page by page:
//! each page is indexed, downloaded in parallel and moved into place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use drivesync_core::domain::RemoteObject;
use drivesync_core::ports::{IRemoteStore, ObjectKind};
use drivesync_index::{MetadataStore, RemoteIndex};

use crate::transfer;
use crate::workspace::{SyncOptions, Workspace};
use crate::{Result, SyncError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloneSummary {
    pub revision: i64,
    pub directories: usize,
    pub downloaded: Vec<PathBuf>,
    pub skipped_native: Vec<String>,
}

/// Clone the drive behind `remote` into `home`
#[instrument(skip(remote, options), fields(home = %home.display()))]
pub async fn clone_remote(
    home: &Path,
    remote: Arc<dyn IRemoteStore>,
    options: SyncOptions,
) -> Result<(Workspace, CloneSummary)> {
    let store = MetadataStore::init(home, options.simulation)?;
    let about = remote.about().await.map_err(SyncError::Remote)?;
    info!(root = %about.root_id, revision = about.largest_revision_id, "Cloning drive");

    let index = RemoteIndex::new(about.root_id, about.largest_revision_id);
    let listing = Arc::clone(&remote);
    let mut ws = Workspace::from_parts(store, index, remote, options)?;
    let mut summary = CloneSummary {
        revision: about.largest_revision_id,
        ..CloneSummary::default()
    };

    // Directories
    let mut dirs: Vec<RemoteObject> = Vec::new();
    let mut pages = listing.list_objects(ObjectKind::Directories);
    while let Some(page) = pages.next().await {
        dirs.extend(page.map_err(SyncError::Remote)?);
    }
    drop(pages);

    let placed = ws.index.tree.reconcile(&dirs)?;
    let mut dir_paths: Vec<&PathBuf> = placed.values().collect();
    dir_paths.sort_by_key(|p| p.components().count());
    for path in dir_paths {
        if ws.remote_ignores().covers(path) {
            debug!(path = %path.display(), "Remote-ignored directory");
            continue;
        }
        if !ws.is_simulation() {
            ws.fs().create_dir(path).await?;
        }
    }
    summary.directories = placed.len();
    info!(directories = summary.directories, "Indexed remote directories");

    // Files, page by page
    let mut pages = listing.list_objects(ObjectKind::Files);
    while let Some(page) = pages.next().await {
        let page = page.map_err(SyncError::Remote)?;
        let (native, files): (Vec<RemoteObject>, Vec<RemoteObject>) =
            page.into_iter().partition(RemoteObject::is_native_document);
        for doc in native {
            warn!(id = %doc.id, title = %doc.title, "Skipping native document without downloadable content");
            summary.skipped_native.push(doc.title);
        }

        let placed = ws.index.tree.reconcile(&files)?;
        let wanted: Vec<(RemoteObject, PathBuf)> = files
            .into_iter()
            .filter_map(|f| {
                let path = placed.get(&f.id)?.clone();
                (!ws.remote_ignores().covers(&path)).then_some((f, path))
            })
            .collect();

        if ws.is_simulation() {
            summary.downloaded.extend(wanted.into_iter().map(|(_, path)| path));
            continue;
        }
        for download in transfer::download_all(&ws, wanted).await? {
            ws.fs()
                .replace_file(&download.staged, &download.target)
                .await?;
            debug!(path = %download.target.display(), "Cloned file");
            summary.downloaded.push(download.target);
        }
    }
    drop(pages);

    summary.downloaded.sort();
    // Downloads carry remote mtimes; stamp once everything is in place
    ws.index.touch_sync_time();
    ws.persist()?;
    info!(
        revision = summary.revision,
        files = summary.downloaded.len(),
        directories = summary.directories,
        "Clone complete"
    );
    Ok((ws, summary))
}
