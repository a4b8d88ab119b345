//! Pull reconciler
//!
//! Applies the remote change feed to the home:
//!
//! ```text
//! Idle -> Fetching -> Conflict-Check -> Applying -> Committed
//!                          |               |
//!                          +--> Aborted <--+
//! ```
//!
//! The feed is applied to a clone of the index. The live index is replaced
//! and persisted only after every local mutation succeeded, so an aborted
//! pull leaves the revision where it was and the next pull replays it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use drivesync_core::domain::{RemoteChangeSet, RemoteId, RemoteObject};

use crate::checksum::hash_file;
use crate::detector::LocalChangeSet;
use crate::filesystem::Removal;
use crate::transfer;
use crate::workspace::Workspace;
use crate::{Result, SyncError};

// ============================================================================
// Options and outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullOptions {
    /// Do not treat local deletions of remotely changed files as conflicts
    pub ignore_deletes: bool,
    /// Let remote files overwrite untracked local files at the same path
    pub ignore_new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Locally modified, deleted or moved files were also changed remotely
    LocalChanges,
    /// Remote files would land on untracked local files
    NewFiles,
}

/// Paths that stopped a pull; nothing was changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub kind: ConflictKind,
    pub paths: BTreeSet<PathBuf>,
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ConflictKind::LocalChanges => "local changes conflict with remote changes",
            ConflictKind::NewFiles => "new local files collide with remote files",
        };
        write!(f, "{} ({} paths)", what, self.paths.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullSummary {
    pub revision: i64,
    pub created_dirs: Vec<PathBuf>,
    pub downloaded: Vec<PathBuf>,
    pub relocated: Vec<(PathBuf, PathBuf)>,
    pub deleted: Vec<PathBuf>,
    /// Paths the feed removed that were kept because they hold local data
    pub kept: Vec<PathBuf>,
    /// Titles of native documents that cannot be downloaded
    pub skipped_native: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullOutcome {
    UpToDate { revision: i64 },
    Pulled(PullSummary),
    Conflicted(ConflictReport),
}

// ============================================================================
// Pull
// ============================================================================

/// Bring remote changes since the index revision into the home
#[instrument(skip(ws), fields(revision = ws.index.last_revision_id))]
pub async fn pull(ws: &mut Workspace, options: PullOptions) -> Result<PullOutcome> {
    // Fetching
    let since = ws.index.last_revision_id;
    let feed = ws
        .remote()
        .get_changes(since)
        .await
        .map_err(SyncError::Remote)?
        .modified_after(ws.index.last_sync_time());

    if feed.largest_revision_id <= since {
        info!(revision = since, "Already up to date");
        return Ok(PullOutcome::UpToDate { revision: since });
    }
    info!(
        from = since,
        to = feed.largest_revision_id,
        changes = feed.changes.len(),
        "Pulling remote changes"
    );

    let local = LocalChangeSet::detect(ws).await?;

    // Conflict-Check
    let touched = feed.touched_ids();
    let conflicts: BTreeSet<PathBuf> = local
        .referenced_ids(!options.ignore_deletes)
        .into_iter()
        .filter(|(id, _)| touched.contains(id))
        .map(|(_, path)| path)
        .collect();
    if !conflicts.is_empty() {
        for path in &conflicts {
            warn!(path = %path.display(), "Conflicting local change");
        }
        warn!(count = conflicts.len(), "Pull aborted: local changes conflict with remote changes");
        return Ok(PullOutcome::Conflicted(ConflictReport {
            kind: ConflictKind::LocalChanges,
            paths: conflicts,
        }));
    }

    // Applying, on a staged copy of the index
    let mut staged = ws.index.clone();
    staged.touch_sync_time();

    let live: Vec<&RemoteObject> = feed.modified_dirs().chain(feed.modified_files()).collect();
    let live_ids: BTreeSet<RemoteId> = live.iter().map(|o| o.id.clone()).collect();
    let previous = staged.tree.find_ids(&live_ids);
    let removed = staged.tree.remove(&feed.removed_ids());
    let placed = staged.tree.reconcile(live.iter().copied())?;

    if !options.ignore_new {
        let collisions: BTreeSet<PathBuf> = placed
            .values()
            .filter(|path| local.new.contains(*path))
            .cloned()
            .collect();
        if !collisions.is_empty() {
            for path in &collisions {
                warn!(path = %path.display(), "Remote file would overwrite new local file");
            }
            return Ok(PullOutcome::Conflicted(ConflictReport {
                kind: ConflictKind::NewFiles,
                paths: collisions,
            }));
        }
    }

    let mut summary = PullSummary::default();
    for doc in feed.native_documents() {
        warn!(id = %doc.id, title = %doc.title, "Skipping native document without downloadable content");
        summary.skipped_native.push(doc.title.clone());
    }

    relocate(ws, &feed, &previous, &placed, &mut summary).await?;
    create_dirs(ws, &feed, &placed, &mut summary).await?;
    download_changed(ws, &feed, &placed, &mut summary).await?;

    // Removed paths together with their tracked descendants, deepest first
    let mut doomed: Vec<PathBuf> = ws
        .index
        .tree
        .all_paths()
        .into_iter()
        .map(|(path, _)| path)
        .filter(|path| removed.iter().any(|r| path.starts_with(r)))
        .collect();
    doomed.sort_by(|a, b| depth(b).cmp(&depth(a)).then_with(|| a.cmp(b)));
    delete_removed(ws, &staged.tree, &local, &doomed, &mut summary).await?;

    // Committed
    staged.advance_revision(feed.largest_revision_id);
    ws.index = staged;
    ws.journal.record_all(local.modified.keys().cloned());
    ws.persist()?;

    summary.revision = ws.index.last_revision_id;
    info!(
        revision = summary.revision,
        downloaded = summary.downloaded.len(),
        created_dirs = summary.created_dirs.len(),
        relocated = summary.relocated.len(),
        deleted = summary.deleted.len(),
        "Pull complete"
    );
    Ok(PullOutcome::Pulled(summary))
}

// ============================================================================
// Apply steps
// ============================================================================

/// Rename local entries of objects whose remote path changed
async fn relocate(
    ws: &Workspace,
    feed: &RemoteChangeSet,
    previous: &BTreeMap<RemoteId, PathBuf>,
    placed: &BTreeMap<RemoteId, PathBuf>,
    summary: &mut PullSummary,
) -> Result<()> {
    let directories: BTreeSet<&RemoteId> = feed.modified_dirs().map(|d| &d.id).collect();
    let mut moves: Vec<(bool, &PathBuf, &PathBuf)> = previous
        .iter()
        .filter_map(|(id, old)| {
            let new = placed.get(id)?;
            (old != new).then_some((directories.contains(id), old, new))
        })
        .collect();
    // directories first, shallow before deep
    moves.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| depth(a.1).cmp(&depth(b.1)))
            .then_with(|| a.1.cmp(b.1))
    });

    let mut applied: Vec<(PathBuf, PathBuf)> = Vec::new();
    for (is_dir, old, new) in moves {
        if ws.remote_ignores().covers(new) {
            debug!(path = %new.display(), "Remote-ignored, not relocating");
            continue;
        }
        let current = follow_relocations(old, &applied);
        if !ws.fs().exists(&current).await || ws.fs().exists(new).await {
            continue;
        }
        if !ws.is_simulation() {
            ws.fs().rename(&current, new).await?;
        }
        info!(from = %current.display(), to = %new.display(), "Relocated");
        if is_dir {
            applied.push((current.clone(), new.clone()));
        }
        summary.relocated.push((current, new.clone()));
    }
    Ok(())
}

/// Where `path` sits after the directory renames applied so far
fn follow_relocations(path: &Path, applied: &[(PathBuf, PathBuf)]) -> PathBuf {
    let mut current = path.to_path_buf();
    for (from, to) in applied {
        if let Ok(rest) = current.strip_prefix(from) {
            current = to.join(rest);
        }
    }
    current
}

async fn create_dirs(
    ws: &Workspace,
    feed: &RemoteChangeSet,
    placed: &BTreeMap<RemoteId, PathBuf>,
    summary: &mut PullSummary,
) -> Result<()> {
    let mut dirs: Vec<&PathBuf> = feed
        .modified_dirs()
        .filter_map(|d| placed.get(&d.id))
        .collect();
    dirs.sort_by_key(|p| depth(p));

    for path in dirs {
        if ws.remote_ignores().covers(path) {
            debug!(path = %path.display(), "Remote-ignored directory");
            continue;
        }
        if ws.fs().is_dir(path).await {
            continue;
        }
        if !ws.is_simulation() {
            ws.fs().create_dir(path).await?;
        }
        summary.created_dirs.push(path.clone());
    }
    Ok(())
}

async fn download_changed(
    ws: &Workspace,
    feed: &RemoteChangeSet,
    placed: &BTreeMap<RemoteId, PathBuf>,
    summary: &mut PullSummary,
) -> Result<()> {
    let mut wanted = Vec::new();
    for file in feed.modified_files() {
        let Some(path) = placed.get(&file.id) else {
            continue;
        };
        if ws.remote_ignores().covers(path) {
            debug!(path = %path.display(), "Remote-ignored file");
            continue;
        }
        if content_differs(ws, path, file).await? {
            wanted.push((file.clone(), path.clone()));
        } else {
            debug!(path = %path.display(), "Local content already matches");
        }
    }

    if ws.is_simulation() {
        summary.downloaded.extend(wanted.into_iter().map(|(_, path)| path));
        return Ok(());
    }

    let staged = transfer::download_all(ws, wanted).await?;
    for download in staged {
        ws.fs().replace_file(&download.staged, &download.target).await?;
        info!(path = %download.target.display(), id = %download.object.id, "Downloaded");
        summary.downloaded.push(download.target);
    }
    summary.downloaded.sort();
    Ok(())
}

async fn content_differs(ws: &Workspace, path: &Path, file: &RemoteObject) -> Result<bool> {
    if !ws.fs().exists(path).await || ws.fs().is_dir(path).await {
        return Ok(true);
    }
    match &file.content_hash {
        Some(remote) => Ok(hash_file(&ws.fs().absolute(path)).await? != *remote),
        None => Ok(true),
    }
}

async fn delete_removed(
    ws: &Workspace,
    staged: &drivesync_index::IndexTree,
    local: &LocalChangeSet,
    doomed: &[PathBuf],
    summary: &mut PullSummary,
) -> Result<()> {
    for path in doomed {
        if staged.exists(path) {
            debug!(path = %path.display(), "Path is occupied by another remote object");
            continue;
        }
        if local.modified.contains_key(path) {
            warn!(path = %path.display(), "Removed remotely but modified locally, keeping it");
            summary.kept.push(path.clone());
            continue;
        }
        if ws.is_simulation() {
            if ws.fs().exists(path).await {
                summary.deleted.push(path.clone());
            }
            continue;
        }
        match ws.fs().remove(path).await? {
            Removal::Removed => {
                info!(path = %path.display(), "Deleted");
                summary.deleted.push(path.clone());
            }
            Removal::KeptNonEmpty => summary.kept.push(path.clone()),
            Removal::Missing => {}
        }
    }
    Ok(())
}

fn depth(path: &Path) -> usize {
    path.components().count()
}
