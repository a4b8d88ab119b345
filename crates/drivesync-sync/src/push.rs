//! Push reconciler
//!
//! Sends local changes to the remote store in dependency order: content of
//! modified files, missing parent directories (shallowest first), metadata
//! patches for moves, new files, then trashing. Whatever the remote created
//! or changed is folded into the index in a final bookkeeping step that runs
//! even when an earlier step failed, so a retry never creates the same
//! object twice.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use drivesync_core::domain::{RemoteId, RemoteObject};
use drivesync_core::ports::{MetadataPatch, NewObject};
use drivesync_index::IndexTree;

use crate::detector::LocalChangeSet;
use crate::transfer::{self, fan_out, partition};
use crate::workspace::Workspace;
use crate::{Result, SyncError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushSummary {
    pub revision: i64,
    pub updated: Vec<PathBuf>,
    pub created_dirs: Vec<PathBuf>,
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub uploaded: Vec<PathBuf>,
    pub trashed: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PushOutcome {
    NothingToPush,
    /// The remote moved on since the last pull
    Stale { local_revision: i64, remote_revision: i64 },
    Pushed(PushSummary),
}

/// Where a path's remote parent comes from
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParentRef {
    Indexed(RemoteId),
    /// The parent directory is created during this push
    Created(PathBuf),
}

/// Send local changes to the remote store
#[instrument(skip(ws), fields(revision = ws.index.last_revision_id))]
pub async fn push(ws: &mut Workspace) -> Result<PushOutcome> {
    let local_revision = ws.index.last_revision_id;
    let remote_revision = ws
        .remote()
        .current_largest_revision()
        .await
        .map_err(SyncError::Remote)?;
    if remote_revision > local_revision {
        warn!(local_revision, remote_revision, "Remote has changes that were not pulled yet");
        return Ok(PushOutcome::Stale {
            local_revision,
            remote_revision,
        });
    }

    let local = LocalChangeSet::detect(ws).await?;
    if local.is_empty() {
        info!("No local changes, nothing to push");
        return Ok(PushOutcome::NothingToPush);
    }

    ws.index.touch_sync_time();
    let mut summary = PushSummary::default();
    let mut changed: Vec<RemoteObject> = Vec::new();

    let applied = apply(ws, &local, &mut changed, &mut summary).await;
    let bookkeeping = fold_changes(ws, &changed).await;

    match (applied, bookkeeping) {
        (Err(e), Err(b)) => {
            error!(error = %b, "Could not record pushed objects in the index");
            Err(e)
        }
        (Err(e), Ok(_)) => Err(e),
        (Ok(()), Err(b)) => Err(b),
        (Ok(()), Ok(revision)) => {
            for path in &summary.updated {
                ws.journal.forget(path);
            }
            ws.save_journal()?;
            summary.revision = revision;
            info!(
                revision,
                updated = summary.updated.len(),
                uploaded = summary.uploaded.len(),
                created_dirs = summary.created_dirs.len(),
                moved = summary.moved.len(),
                trashed = summary.trashed.len(),
                "Push complete"
            );
            Ok(PushOutcome::Pushed(summary))
        }
    }
}

async fn apply(
    ws: &mut Workspace,
    local: &LocalChangeSet,
    changed: &mut Vec<RemoteObject>,
    summary: &mut PushSummary,
) -> Result<()> {
    // Modified content, journaled first
    ws.journal.record_all(local.modified.keys().cloned());
    ws.save_journal()?;
    update_modified(ws, local, changed, summary).await?;

    // Parents of new files and move destinations
    let targets: Vec<PathBuf> = local
        .new
        .iter()
        .cloned()
        .chain(local.moved.iter().map(|m| m.to.clone()))
        .collect();
    let parents = resolve_parents(&ws.index.tree, &targets);
    let created_dirs = create_directories(ws, &targets, &parents, changed, summary).await?;
    let parent_of = |path: &Path| -> Result<RemoteId> {
        match parents.get(path) {
            Some(ParentRef::Indexed(id)) => Ok(id.clone()),
            Some(ParentRef::Created(dir)) => created_dirs
                .get(dir)
                .cloned()
                .ok_or_else(|| SyncError::UnresolvedParent(path.to_path_buf())),
            None => Err(SyncError::UnresolvedParent(path.to_path_buf())),
        }
    };

    move_files(ws, local, &parent_of, changed, summary).await?;
    upload_new_files(ws, local, &parent_of, changed, summary).await?;
    trash_deleted(ws, local, summary).await?;
    Ok(())
}

// ============================================================================
// Steps
// ============================================================================

async fn update_modified(
    ws: &Workspace,
    local: &LocalChangeSet,
    changed: &mut Vec<RemoteObject>,
    summary: &mut PushSummary,
) -> Result<()> {
    if local.modified.is_empty() {
        return Ok(());
    }
    if ws.is_simulation() {
        summary.updated.extend(local.modified.keys().cloned());
        return Ok(());
    }

    let remote = ws.remote();
    let fs = ws.fs();
    let items: Vec<(&PathBuf, &RemoteId)> = local.modified.iter().collect();
    let results = fan_out(items, ws.options().transfer_concurrency, |(path, id)| async move {
        let object = transfer::upload_update(remote, fs, path, id).await?;
        info!(path = %path.display(), "Updated");
        Ok::<_, SyncError>((path.clone(), object))
    })
    .await;

    let (done, failure) = partition(results);
    for (path, object) in done {
        summary.updated.push(path);
        changed.push(object);
    }
    summary.updated.sort();
    failure.map_or(Ok(()), Err)
}

/// Resolve the remote parent of every target path.
///
/// Each path's parent directory is looked up in the index; unknown parents
/// are queued and resolved the same way one level up. Paths directly under
/// the home resolve to the root. The map holds an entry for every target
/// and for every directory that has to be created.
fn resolve_parents(tree: &IndexTree, targets: &[PathBuf]) -> BTreeMap<PathBuf, ParentRef> {
    let mut resolved = BTreeMap::new();
    let mut queue: VecDeque<PathBuf> = targets.iter().cloned().collect();

    while let Some(path) = queue.pop_front() {
        if resolved.contains_key(&path) {
            continue;
        }
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let entry = if parent.as_os_str().is_empty() {
            ParentRef::Indexed(RemoteId::root_alias())
        } else if let Some(id) = tree.find(&parent) {
            ParentRef::Indexed(id.clone())
        } else {
            queue.push_back(parent.clone());
            ParentRef::Created(parent)
        };
        resolved.insert(path, entry);
    }
    resolved
}

/// Create missing directories shallowest first; returns path -> new id
async fn create_directories(
    ws: &Workspace,
    targets: &[PathBuf],
    parents: &BTreeMap<PathBuf, ParentRef>,
    changed: &mut Vec<RemoteObject>,
    summary: &mut PushSummary,
) -> Result<BTreeMap<PathBuf, RemoteId>> {
    let targets: BTreeSet<&PathBuf> = targets.iter().collect();
    let mut dirs: Vec<&PathBuf> = parents.keys().filter(|p| !targets.contains(p)).collect();
    dirs.sort_by(|a, b| {
        a.components()
            .count()
            .cmp(&b.components().count())
            .then_with(|| a.cmp(b))
    });

    let mut created: BTreeMap<PathBuf, RemoteId> = BTreeMap::new();
    for dir in dirs {
        let parent_id = match &parents[dir] {
            ParentRef::Indexed(id) => id.clone(),
            ParentRef::Created(parent) => created
                .get(parent)
                .cloned()
                .ok_or_else(|| SyncError::UnresolvedParent(dir.clone()))?,
        };
        let title = file_title(dir)?;
        let object = if ws.is_simulation() {
            RemoteObject::directory(Workspace::simulated_id()?, title, parent_id)
        } else {
            ws.remote()
                .create_directory(NewObject::new(title, parent_id))
                .await
                .map_err(SyncError::Remote)?
        };
        info!(path = %dir.display(), id = %object.id, "Created remote directory");
        created.insert(dir.clone(), object.id.clone());
        summary.created_dirs.push(dir.clone());
        changed.push(object);
    }
    Ok(created)
}

async fn move_files<F>(
    ws: &Workspace,
    local: &LocalChangeSet,
    parent_of: &F,
    changed: &mut Vec<RemoteObject>,
    summary: &mut PushSummary,
) -> Result<()>
where
    F: Fn(&Path) -> Result<RemoteId>,
{
    let tree = &ws.index.tree;
    let mut patches: Vec<(RemoteId, MetadataPatch)> = Vec::new();
    for m in &local.moved {
        let Some(node) = tree.node(&m.id) else {
            warn!(id = %m.id, "Moved file vanished from the index");
            continue;
        };
        let title = file_title(&m.to)?;
        let mut new_parent = parent_of(&m.to)?;
        if new_parent.is_root_alias() {
            new_parent = tree.root_id().clone();
        }

        let patch = MetadataPatch {
            title: (node.title != title).then_some(title),
            parent_id: (node.parent.as_ref() != Some(&new_parent)).then_some(new_parent),
        };
        if patch.is_empty() {
            continue;
        }
        debug!(id = %m.id, ?patch, "Move patch");
        summary.moved.push((m.from.clone(), m.to.clone()));
        patches.push((m.id.clone(), patch));
    }
    if patches.is_empty() {
        return Ok(());
    }

    if ws.is_simulation() {
        for (id, patch) in patches {
            if let Some(node) = tree.node(&id) {
                let parent = patch
                    .parent_id
                    .or_else(|| node.parent.clone())
                    .unwrap_or_else(RemoteId::root_alias);
                let title = patch.title.unwrap_or_else(|| node.title.clone());
                changed.push(RemoteObject::file(id, title, parent, None));
            }
        }
        return Ok(());
    }

    let patched = ws
        .remote()
        .patch_many(patches)
        .await
        .map_err(SyncError::Remote)?;
    for object in &patched {
        info!(id = %object.id, title = %object.title, "Moved remote file");
    }
    changed.extend(patched);
    Ok(())
}

async fn upload_new_files<F>(
    ws: &Workspace,
    local: &LocalChangeSet,
    parent_of: &F,
    changed: &mut Vec<RemoteObject>,
    summary: &mut PushSummary,
) -> Result<()>
where
    F: Fn(&Path) -> Result<RemoteId>,
{
    let mut items = Vec::with_capacity(local.new.len());
    for path in &local.new {
        let mut metadata = NewObject::new(file_title(path)?, parent_of(path)?);
        metadata.modified_time = Some(Utc::now());
        items.push((path, metadata));
    }
    if items.is_empty() {
        return Ok(());
    }

    if ws.is_simulation() {
        for (path, metadata) in items {
            let id = Workspace::simulated_id()?;
            changed.push(RemoteObject::file(id, metadata.title, metadata.parent_id, None));
            summary.uploaded.push(path.clone());
        }
        return Ok(());
    }

    let remote = ws.remote();
    let fs = ws.fs();
    let results = fan_out(items, ws.options().transfer_concurrency, |(path, metadata)| async move {
        let object = transfer::upload_new(remote, fs, path, metadata).await?;
        info!(path = %path.display(), id = %object.id, "Uploaded");
        Ok::<_, SyncError>((path.clone(), object))
    })
    .await;

    let (done, failure) = partition(results);
    for (path, object) in done {
        summary.uploaded.push(path);
        changed.push(object);
    }
    summary.uploaded.sort();
    failure.map_or(Ok(()), Err)
}

/// Trash deleted paths; a path below another deleted path goes with it
async fn trash_deleted(
    ws: &mut Workspace,
    local: &LocalChangeSet,
    summary: &mut PushSummary,
) -> Result<()> {
    if local.deleted.is_empty() {
        return Ok(());
    }
    let tops: Vec<(&PathBuf, &RemoteId)> = local
        .deleted
        .iter()
        .filter(|(path, _)| {
            !path
                .ancestors()
                .skip(1)
                .any(|a| local.deleted.contains_key(a))
        })
        .collect();
    let ids: Vec<RemoteId> = tops.iter().map(|(_, id)| (*id).clone()).collect();

    if !ws.is_simulation() {
        ws.remote()
            .trash_many(&ids)
            .await
            .map_err(SyncError::Remote)?;
    }
    for (path, id) in &tops {
        info!(path = %path.display(), id = %id, "Trashed remote object");
        summary.trashed.push((*path).clone());
    }
    let all: BTreeSet<RemoteId> = local.deleted.values().cloned().collect();
    ws.index.tree.remove(&all);
    Ok(())
}

/// Fold remote results into the index if the remote revision advanced
async fn fold_changes(ws: &mut Workspace, changed: &[RemoteObject]) -> Result<i64> {
    let latest = ws
        .remote()
        .current_largest_revision()
        .await
        .map_err(SyncError::Remote)?;
    if latest <= ws.index.last_revision_id {
        debug!(latest, "Remote revision unchanged, index not updated");
        return Ok(ws.index.last_revision_id);
    }
    ws.index.tree.reconcile(changed)?;
    ws.index.advance_revision(latest);
    ws.persist()?;
    info!(revision = latest, objects = changed.len(), "Recorded pushed objects in the index");
    Ok(latest)
}

fn file_title(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SyncError::UnresolvedParent(path.to_path_buf()))
}
