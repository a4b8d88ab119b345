//! Status report
//!
//! Read-only: the local change set plus the remote changes since the index
//! revision, resolved to local paths where the index knows them.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use drivesync_core::domain::{RemoteId, RemoteObject};
use drivesync_index::IndexTree;

use crate::detector::LocalChangeSet;
use crate::workspace::Workspace;
use crate::{Result, SyncError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusOptions {
    /// Skip the remote change feed
    pub local_only: bool,
    /// List remote changes since this revision instead of the index's
    pub revision: Option<i64>,
}

/// A remote change; `path` is where it lives (or would live) locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEntry {
    pub id: RemoteId,
    pub path: Option<PathBuf>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteStatus {
    pub since_revision: i64,
    pub largest_revision: i64,
    pub modified: Vec<RemoteEntry>,
    pub deleted: Vec<RemoteEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub home: PathBuf,
    pub revision: i64,
    pub last_sync: DateTime<Utc>,
    pub local: LocalChangeSet,
    pub remote: Option<RemoteStatus>,
}

#[instrument(skip(ws))]
pub async fn status(ws: &Workspace, options: StatusOptions) -> Result<StatusReport> {
    let local = LocalChangeSet::detect(ws).await?;

    let remote = if options.local_only {
        None
    } else {
        let since = options.revision.unwrap_or(ws.index.last_revision_id);
        let feed = ws
            .remote()
            .get_changes(since)
            .await
            .map_err(SyncError::Remote)?
            .modified_after(ws.index.last_sync_time());
        let tree = &ws.index.tree;

        let mut modified: Vec<RemoteEntry> = feed
            .modified_dirs()
            .chain(feed.modified_files())
            .map(|o| RemoteEntry {
                id: o.id.clone(),
                path: prospective_path(tree, o),
                title: Some(o.title.clone()),
            })
            .collect();
        let mut deleted: Vec<RemoteEntry> = feed
            .removed_ids()
            .into_iter()
            .map(|id| RemoteEntry {
                path: tree.path_of(&id),
                title: None,
                id,
            })
            .collect();
        modified.sort_by(|a, b| a.path.cmp(&b.path));
        deleted.sort_by(|a, b| a.path.cmp(&b.path));

        Some(RemoteStatus {
            since_revision: since,
            largest_revision: feed.largest_revision_id,
            modified,
            deleted,
        })
    };

    Ok(StatusReport {
        home: ws.home().to_path_buf(),
        revision: ws.index.last_revision_id,
        last_sync: ws.index.last_sync_time(),
        local,
        remote,
    })
}

/// Indexed path, or the parent's path joined with the new title
fn prospective_path(tree: &IndexTree, object: &RemoteObject) -> Option<PathBuf> {
    tree.path_of(&object.id).or_else(|| {
        tree.path_of(&object.parent_id)
            .map(|parent| parent.join(&object.title))
    })
}
