//! Reset reconciler
//!
//! Discards local edits: modified and deleted paths are restored from the
//! remote store, detected moves are moved back, and untracked new files are
//! deleted. The index is not touched.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, instrument, warn};

use drivesync_core::domain::{RemoteId, RemoteObject};

use crate::detector::LocalChangeSet;
use crate::filesystem::Removal;
use crate::transfer;
use crate::workspace::Workspace;
use crate::{Result, SyncError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub restored: Vec<PathBuf>,
    pub recreated_dirs: Vec<PathBuf>,
    pub moved_back: Vec<(PathBuf, PathBuf)>,
    pub deleted_new: Vec<PathBuf>,
}

/// Make the home match the index again
#[instrument(skip(ws), fields(home = %ws.home().display()))]
pub async fn reset(ws: &mut Workspace) -> Result<ResetSummary> {
    let local = LocalChangeSet::detect(ws).await?;
    let mut summary = ResetSummary::default();

    let ids: Vec<RemoteId> = local
        .modified
        .values()
        .chain(local.deleted.values())
        .cloned()
        .collect();
    let mut objects: Vec<RemoteObject> = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(ws.options().metadata_batch_size) {
        let batch = ws
            .remote()
            .get_objects(chunk)
            .await
            .map_err(SyncError::Remote)?;
        objects.extend(batch);
    }

    let mut dirs = Vec::new();
    let mut wanted = Vec::new();
    for object in objects {
        let Some(path) = ws.index.tree.path_of(&object.id) else {
            warn!(id = %object.id, "Object is no longer indexed, not restoring");
            continue;
        };
        if object.is_directory {
            dirs.push(path);
        } else if object.is_native_document() {
            warn!(path = %path.display(), "Native document cannot be restored");
        } else {
            wanted.push((object, path));
        }
    }

    dirs.sort_by_key(|p| p.components().count());
    for dir in dirs {
        if !ws.is_simulation() {
            ws.fs().create_dir(&dir).await?;
        }
        summary.recreated_dirs.push(dir);
    }

    for m in &local.moved {
        if !ws.is_simulation() {
            ws.fs().rename(&m.to, &m.from).await?;
        }
        info!(from = %m.to.display(), to = %m.from.display(), "Moved back");
        summary.moved_back.push((m.to.clone(), m.from.clone()));
    }

    if ws.is_simulation() {
        summary.restored = wanted.into_iter().map(|(_, path)| path).collect();
    } else {
        for download in transfer::download_all(ws, wanted).await? {
            ws.fs()
                .replace_file(&download.staged, &download.target)
                .await?;
            info!(path = %download.target.display(), "Restored");
            summary.restored.push(download.target);
        }
    }
    summary.restored.sort();

    for path in &local.new {
        let removed = if ws.is_simulation() {
            Removal::Removed
        } else {
            ws.fs().remove(path).await?
        };
        if removed == Removal::Removed {
            info!(path = %path.display(), "Deleted untracked file");
            summary.deleted_new.push(path.clone());
        }
    }

    ws.journal.clear();
    ws.save_journal()?;
    info!(
        restored = summary.restored.len(),
        moved_back = summary.moved_back.len(),
        deleted_new = summary.deleted_new.len(),
        "Reset complete"
    );
    Ok(summary)
}
