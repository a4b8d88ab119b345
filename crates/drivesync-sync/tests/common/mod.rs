//! Shared fixtures for reconciler integration tests
//!
//! [`MemoryRemote`] is an in-memory drive: objects with content, a revision
//! counter and a change log. Every mutation bumps the revision and appends
//! a change, like the real service.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tempfile::TempDir;

use drivesync_core::domain::{ChangeEvent, RemoteChangeSet, RemoteId, RemoteObject};
use drivesync_core::ports::{
    AboutInfo, Download, IRemoteStore, MetadataPatch, NewObject, ObjectKind, ObjectPages,
};
use drivesync_sync::checksum::hash_bytes;
use drivesync_sync::{clone_remote, SyncOptions, Workspace};

// ============================================================================
// MemoryRemote
// ============================================================================

pub const ROOT: &str = "ROOT";

struct Entry {
    object: RemoteObject,
    content: Vec<u8>,
}

struct State {
    revision: i64,
    next_id: u64,
    objects: BTreeMap<RemoteId, Entry>,
    /// (revision, id) of every change
    log: Vec<(i64, RemoteId)>,
    mutations: usize,
    corrupt_downloads: bool,
    failing_uploads: BTreeSet<String>,
}

pub struct MemoryRemote {
    root: RemoteId,
    state: Mutex<State>,
}

pub fn id(s: &str) -> RemoteId {
    RemoteId::new(s).unwrap()
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            root: id(ROOT),
            state: Mutex::new(State {
                revision: 1,
                next_id: 1,
                objects: BTreeMap::new(),
                log: Vec::new(),
                mutations: 0,
                corrupt_downloads: false,
                failing_uploads: BTreeSet::new(),
            }),
        })
    }

    pub fn root(&self) -> RemoteId {
        self.root.clone()
    }

    // ------------------------------------------------------------------------
    // Setup helpers (they act like another client changing the drive)
    // ------------------------------------------------------------------------

    pub fn add_dir(&self, title: &str, parent: &RemoteId) -> RemoteId {
        let mut state = self.state.lock().unwrap();
        let new_id = Self::allocate(&mut state);
        let object = RemoteObject::directory(new_id.clone(), title, parent.clone());
        Self::store(&mut state, object, Vec::new());
        new_id
    }

    pub fn add_file(&self, title: &str, parent: &RemoteId, content: &[u8]) -> RemoteId {
        let mut state = self.state.lock().unwrap();
        let new_id = Self::allocate(&mut state);
        let object = RemoteObject::file(
            new_id.clone(),
            title,
            parent.clone(),
            Some(hash_bytes(content)),
        );
        Self::store(&mut state, object, content.to_vec());
        new_id
    }

    pub fn add_native_document(&self, title: &str, parent: &RemoteId) -> RemoteId {
        let mut state = self.state.lock().unwrap();
        let new_id = Self::allocate(&mut state);
        let object = RemoteObject::file(new_id.clone(), title, parent.clone(), None)
            .with_mime_type("application/vnd.google-apps.spreadsheet");
        Self::store(&mut state, object, Vec::new());
        new_id
    }

    pub fn set_content(&self, target: &RemoteId, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let mut object = state.objects[target].object.clone();
        object.content_hash = Some(hash_bytes(content));
        object.modified_time = Utc::now();
        Self::store(&mut state, object, content.to_vec());
    }

    pub fn relocate(&self, target: &RemoteId, title: &str, parent: &RemoteId) {
        let mut state = self.state.lock().unwrap();
        let entry = &state.objects[target];
        let content = entry.content.clone();
        let mut object = entry.object.clone();
        object.title = title.to_string();
        object.parent_id = parent.clone();
        object.modified_time = Utc::now();
        Self::store(&mut state, object, content);
    }

    pub fn trash_object(&self, target: &RemoteId) {
        let mut state = self.state.lock().unwrap();
        let entry = &state.objects[target];
        let content = entry.content.clone();
        let mut object = entry.object.clone();
        object.is_trashed = true;
        object.modified_time = Utc::now();
        Self::store(&mut state, object, content);
    }

    pub fn corrupt_downloads(&self, corrupt: bool) {
        self.state.lock().unwrap().corrupt_downloads = corrupt;
    }

    pub fn fail_uploads_named(&self, title: &str) {
        self.state.lock().unwrap().failing_uploads.insert(title.to_string());
    }

    pub fn accept_all_uploads(&self) {
        self.state.lock().unwrap().failing_uploads.clear();
    }

    /// Live objects with the given title
    pub fn count_titled(&self, title: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .objects
            .values()
            .filter(|e| !e.object.is_trashed && e.object.title == title)
            .count()
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn revision(&self) -> i64 {
        self.state.lock().unwrap().revision
    }

    /// Number of mutating calls made through the store port
    pub fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    pub fn object(&self, target: &RemoteId) -> Option<RemoteObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(target)
            .map(|e| e.object.clone())
    }

    pub fn content(&self, target: &RemoteId) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(target)
            .map(|e| e.content.clone())
    }

    /// Live (untrashed) object at a title path below the root
    pub fn find(&self, path: &str) -> Option<RemoteObject> {
        let state = self.state.lock().unwrap();
        let mut parent = self.root.clone();
        let mut found = None;
        for title in path.split('/') {
            let object = state
                .objects
                .values()
                .map(|e| &e.object)
                .find(|o| !o.is_trashed && o.title == title && self.is_child_of(o, &parent))?;
            parent = object.id.clone();
            found = Some(object.clone());
        }
        found
    }

    fn is_child_of(&self, object: &RemoteObject, parent: &RemoteId) -> bool {
        object.parent_id == *parent || (object.parent_id.is_root_alias() && *parent == self.root)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn allocate(state: &mut State) -> RemoteId {
        let new_id = id(&format!("id{}", state.next_id));
        state.next_id += 1;
        new_id
    }

    fn store(state: &mut State, object: RemoteObject, content: Vec<u8>) {
        state.revision += 1;
        let revision = state.revision;
        state.log.push((revision, object.id.clone()));
        state.objects.insert(object.id.clone(), Entry { object, content });
    }

    fn mutate(&self) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        state
    }

    fn get(state: &State, target: &RemoteId) -> anyhow::Result<RemoteObject> {
        state
            .objects
            .get(target)
            .map(|e| e.object.clone())
            .ok_or_else(|| anyhow!("File not found: {target}"))
    }

    fn resolve(&self, parent: &RemoteId) -> RemoteId {
        if parent.is_root_alias() {
            self.root.clone()
        } else {
            parent.clone()
        }
    }
}

#[async_trait]
impl IRemoteStore for MemoryRemote {
    async fn about(&self) -> anyhow::Result<AboutInfo> {
        Ok(AboutInfo {
            root_id: self.root.clone(),
            largest_revision_id: self.revision(),
        })
    }

    fn list_objects(&self, kind: ObjectKind) -> ObjectPages<'_> {
        let state = self.state.lock().unwrap();
        // newest first, so children regularly precede their parents
        let mut objects: Vec<RemoteObject> = state
            .objects
            .values()
            .map(|e| e.object.clone())
            .filter(|o| !o.is_trashed)
            .filter(|o| o.is_directory == (kind == ObjectKind::Directories))
            .collect();
        objects.reverse();
        let pages: Vec<anyhow::Result<Vec<RemoteObject>>> =
            objects.chunks(2).map(|c| Ok(c.to_vec())).collect();
        stream::iter(pages).boxed()
    }

    async fn get_changes(&self, since_revision: i64) -> anyhow::Result<RemoteChangeSet> {
        let state = self.state.lock().unwrap();
        let mut latest: BTreeMap<RemoteId, ()> = BTreeMap::new();
        for (revision, changed) in &state.log {
            if *revision > since_revision {
                latest.insert(changed.clone(), ());
            }
        }
        let changes = latest
            .into_keys()
            .map(|changed| match state.objects.get(&changed) {
                Some(entry) => ChangeEvent::modified(entry.object.clone()),
                None => ChangeEvent::deleted(changed),
            })
            .collect();
        Ok(RemoteChangeSet::new(changes, state.revision))
    }

    async fn get_object(&self, target: &RemoteId) -> anyhow::Result<RemoteObject> {
        Self::get(&self.state.lock().unwrap(), target)
    }

    async fn download_content(&self, target: &RemoteId) -> anyhow::Result<Download> {
        let state = self.state.lock().unwrap();
        let entry = state
            .objects
            .get(target)
            .ok_or_else(|| anyhow!("File not found: {target}"))?;
        let mut bytes = entry.content.clone();
        if state.corrupt_downloads {
            bytes.extend_from_slice(b"garbage");
        }
        Ok(Download {
            content: Box::new(Cursor::new(bytes)),
            content_hash: entry.object.content_hash.clone(),
        })
    }

    async fn upload_new(&self, metadata: NewObject, content: Vec<u8>) -> anyhow::Result<RemoteObject> {
        let mut state = self.mutate();
        if state.failing_uploads.contains(&metadata.title) {
            bail!("upload of {} rejected", metadata.title);
        }
        let new_id = Self::allocate(&mut state);
        let object = RemoteObject::file(
            new_id,
            metadata.title,
            self.resolve(&metadata.parent_id),
            Some(hash_bytes(&content)),
        );
        Self::store(&mut state, object.clone(), content);
        Ok(object)
    }

    async fn update_content(&self, target: &RemoteId, content: Vec<u8>) -> anyhow::Result<RemoteObject> {
        let mut state = self.mutate();
        let mut object = Self::get(&state, target)?;
        object.content_hash = Some(hash_bytes(&content));
        object.modified_time = Utc::now();
        Self::store(&mut state, object.clone(), content);
        Ok(object)
    }

    async fn patch_metadata(&self, target: &RemoteId, patch: MetadataPatch) -> anyhow::Result<RemoteObject> {
        let mut state = self.mutate();
        let mut object = Self::get(&state, target)?;
        let content = state.objects[target].content.clone();
        if let Some(title) = patch.title {
            object.title = title;
        }
        if let Some(parent) = patch.parent_id {
            object.parent_id = self.resolve(&parent);
        }
        object.modified_time = Utc::now();
        Self::store(&mut state, object.clone(), content);
        Ok(object)
    }

    async fn trash(&self, target: &RemoteId) -> anyhow::Result<()> {
        let mut state = self.mutate();
        let mut object = Self::get(&state, target)?;
        let content = state.objects[target].content.clone();
        object.is_trashed = true;
        Self::store(&mut state, object, content);
        Ok(())
    }

    async fn create_directory(&self, metadata: NewObject) -> anyhow::Result<RemoteObject> {
        let mut state = self.mutate();
        let new_id = Self::allocate(&mut state);
        let object = RemoteObject::directory(new_id, metadata.title, self.resolve(&metadata.parent_id));
        Self::store(&mut state, object.clone(), Vec::new());
        Ok(object)
    }
}

// ============================================================================
// Workspace fixtures
// ============================================================================

pub fn options() -> SyncOptions {
    SyncOptions {
        simulation: false,
        transfer_concurrency: 4,
        metadata_batch_size: 2,
    }
}

/// Clone `remote` into a fresh temp home
pub async fn cloned(remote: &Arc<MemoryRemote>) -> (TempDir, Workspace) {
    let home = TempDir::new().unwrap();
    let store: Arc<dyn IRemoteStore> = remote.clone();
    let (ws, _) = clone_remote(home.path(), store, options()).await.unwrap();
    settle().await;
    (home, ws)
}

/// Clone into a fresh temp home whose remote ignore file holds `patterns`
pub async fn cloned_ignoring(remote: &Arc<MemoryRemote>, patterns: &str) -> (TempDir, Workspace) {
    let home = TempDir::new().unwrap();
    set_remote_ignores(home.path(), patterns);
    let store: Arc<dyn IRemoteStore> = remote.clone();
    let (ws, _) = clone_remote(home.path(), store, options()).await.unwrap();
    settle().await;
    (home, ws)
}

/// Replace `.drivesync/remote_ignore.txt`; takes effect on the next reopen
pub fn set_remote_ignores(home: &Path, patterns: &str) {
    write(home, ".drivesync/remote_ignore.txt", patterns.as_bytes());
}

/// Reopen a home from its persisted state
pub fn reopen(home: &Path, remote: &Arc<MemoryRemote>, options: SyncOptions) -> Workspace {
    let store: Arc<dyn IRemoteStore> = remote.clone();
    Workspace::open(home, store, options).unwrap()
}

/// Let the coarse filesystem clock move past the last sync time
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn write(home: &Path, rel: &str, content: &[u8]) {
    let path = home.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

pub fn read(home: &Path, rel: &str) -> Option<Vec<u8>> {
    std::fs::read(home.join(rel)).ok()
}

pub fn p(s: &str) -> PathBuf {
    PathBuf::from(s)
}
