//! Local change detection
//!
//! Compares a walk of the home against the index and the last sync time:
//!
//! 1. Indexed paths that are gone locally are *deleted*, unless a local or
//!    remote ignore rule covers them or one of their ancestors. Remote-ignored
//!    paths are indexed but never downloaded, so their absence is expected.
//! 2. Files modified after the last sync, files the index does not know, and
//!    journaled paths are *changed*. The sync time is kept in milliseconds,
//!    so mtimes are compared at that precision.
//! 3. Changed paths with an index id are *modified*, the rest are *new*.
//! 4. A new file whose content hash equals the remote checksum of a deleted
//!    path is a *move* of that path. Candidates are visited in sorted path
//!    order and each deleted path explains at most one new file, so the
//!    first match wins deterministically.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use drivesync_core::domain::{ContentHash, RemoteId};

use crate::checksum::hash_file;
use crate::workspace::Workspace;
use crate::{Result, SyncError};

/// A deleted index path that reappeared with identical content elsewhere
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LocalMove {
    pub from: PathBuf,
    pub id: RemoteId,
    pub to: PathBuf,
}

/// Classification of local paths relative to the index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalChangeSet {
    pub modified: BTreeMap<PathBuf, RemoteId>,
    pub new: BTreeSet<PathBuf>,
    pub deleted: BTreeMap<PathBuf, RemoteId>,
    pub moved: Vec<LocalMove>,
}

impl LocalChangeSet {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty()
            && self.new.is_empty()
            && self.deleted.is_empty()
            && self.moved.is_empty()
    }

    /// Ids referenced by modified, deleted and moved entries, with the
    /// local path each one stands for
    pub fn referenced_ids(&self, include_deleted: bool) -> BTreeMap<RemoteId, PathBuf> {
        let mut ids: BTreeMap<RemoteId, PathBuf> = self
            .modified
            .iter()
            .map(|(p, id)| (id.clone(), p.clone()))
            .collect();
        if include_deleted {
            ids.extend(self.deleted.iter().map(|(p, id)| (id.clone(), p.clone())));
        }
        ids.extend(self.moved.iter().map(|m| (m.id.clone(), m.from.clone())));
        ids
    }

    /// Build the change set for the workspace's home
    #[instrument(skip(ws), fields(home = %ws.home().display()))]
    pub async fn detect(ws: &Workspace) -> Result<Self> {
        let entries = ws.fs().scan(ws.ignores()).await?;
        let last_sync_millis = ws.index.last_sync_time_millis;
        let tree = &ws.index.tree;

        let local_files: BTreeSet<&Path> = entries.iter().map(|e| e.path.as_path()).collect();

        // 1. deleted
        let mut deleted = BTreeMap::new();
        for (path, id) in tree.all_paths() {
            if local_files.contains(path.as_path())
                || ws.ignores().covers(&path)
                || ws.remote_ignores().covers(&path)
            {
                continue;
            }
            if !ws.fs().exists(&path).await {
                deleted.insert(path, id);
            }
        }

        // 2. changed
        let mut changed: BTreeSet<PathBuf> = entries
            .iter()
            .filter(|e| {
                e.modified.timestamp_millis() > last_sync_millis || tree.find(&e.path).is_none()
            })
            .map(|e| e.path.clone())
            .collect();
        changed.extend(
            ws.journal
                .iter()
                .filter(|p| local_files.contains(p.as_path()))
                .cloned(),
        );

        // 3. classify
        let mut modified = BTreeMap::new();
        let mut new = BTreeSet::new();
        for path in changed {
            match tree.find(&path) {
                Some(id) => {
                    modified.insert(path, id.clone());
                }
                None => {
                    new.insert(path);
                }
            }
        }

        let mut changes = Self {
            modified,
            new,
            deleted,
            moved: Vec::new(),
        };

        // 4. moves
        if !changes.new.is_empty() && !changes.deleted.is_empty() {
            let checksums = deleted_checksums(ws, &changes.deleted).await?;
            changes.detect_moves(&checksums, ws).await?;
        }

        info!(
            modified = changes.modified.len(),
            new = changes.new.len(),
            deleted = changes.deleted.len(),
            moved = changes.moved.len(),
            "Detected local changes"
        );
        Ok(changes)
    }

    async fn detect_moves(
        &mut self,
        checksums: &BTreeMap<PathBuf, ContentHash>,
        ws: &Workspace,
    ) -> Result<()> {
        if checksums.is_empty() {
            return Ok(());
        }
        let mut memo: HashMap<PathBuf, ContentHash> = HashMap::new();
        let mut consumed: BTreeSet<&PathBuf> = BTreeSet::new();
        let mut moves = Vec::new();

        for candidate in &self.new {
            let hash = match memo.get(candidate) {
                Some(h) => h.clone(),
                None => {
                    let h = hash_file(&ws.fs().absolute(candidate)).await?;
                    memo.insert(candidate.clone(), h.clone());
                    h
                }
            };
            let found = checksums
                .iter()
                .find(|(path, remote)| **remote == hash && !consumed.contains(path));
            let Some((from, _)) = found else {
                continue;
            };
            consumed.insert(from);
            if let Some(id) = self.deleted.get(from).cloned() {
                debug!(from = %from.display(), to = %candidate.display(), "Detected move");
                moves.push(LocalMove {
                    from: from.clone(),
                    id,
                    to: candidate.clone(),
                });
            }
        }

        for m in &moves {
            self.new.remove(&m.to);
            self.deleted.remove(&m.from);
        }
        self.moved = moves;
        Ok(())
    }
}

/// Remote checksums of deleted paths that are files, fetched in batches
async fn deleted_checksums(
    ws: &Workspace,
    deleted: &BTreeMap<PathBuf, RemoteId>,
) -> Result<BTreeMap<PathBuf, ContentHash>> {
    let by_id: HashMap<&RemoteId, &PathBuf> = deleted.iter().map(|(p, id)| (id, p)).collect();
    let ids: Vec<RemoteId> = deleted.values().cloned().collect();
    let mut checksums = BTreeMap::new();

    for chunk in ids.chunks(ws.options().metadata_batch_size) {
        let objects = ws
            .remote()
            .get_objects(chunk)
            .await
            .map_err(SyncError::Remote)?;
        for object in objects {
            if object.is_directory {
                continue;
            }
            if let (Some(hash), Some(path)) = (object.content_hash, by_id.get(&object.id)) {
                checksums.insert((*path).clone(), hash);
            }
        }
    }
    debug!(candidates = checksums.len(), "Fetched checksums of deleted paths");
    Ok(checksums)
}
