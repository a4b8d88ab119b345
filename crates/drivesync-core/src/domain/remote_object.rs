//! Remote object metadata and the remote change feed
//!
//! `RemoteObject` is the read-only view of a file or folder in the remote
//! store. `RemoteChangeSet` is one fetched page-accumulated slice of the
//! change feed, together with the largest revision the service reported.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{ContentHash, RemoteId};

/// MIME type the remote service uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Prefix shared by native (export-only) document types
const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

// ============================================================================
// RemoteObject
// ============================================================================

/// Metadata of one object in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub id: RemoteId,
    pub title: String,
    /// Parent folder id; [`RemoteId::root_alias`] when the object sits
    /// directly in the drive root or reports no parent.
    pub parent_id: RemoteId,
    pub is_directory: bool,
    pub mime_type: Option<String>,
    /// MD5 of the content; absent for folders and native documents.
    pub content_hash: Option<ContentHash>,
    pub modified_time: DateTime<Utc>,
    pub is_trashed: bool,
}

impl RemoteObject {
    /// Build a regular file object
    pub fn file(
        id: RemoteId,
        title: impl Into<String>,
        parent_id: RemoteId,
        content_hash: Option<ContentHash>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            parent_id,
            is_directory: false,
            mime_type: None,
            content_hash,
            modified_time: Utc::now(),
            is_trashed: false,
        }
    }

    /// Build a folder object
    pub fn directory(id: RemoteId, title: impl Into<String>, parent_id: RemoteId) -> Self {
        Self {
            id,
            title: title.into(),
            parent_id,
            is_directory: true,
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            content_hash: None,
            modified_time: Utc::now(),
            is_trashed: false,
        }
    }

    /// Replace the modification time
    #[must_use]
    pub fn with_modified_time(mut self, modified_time: DateTime<Utc>) -> Self {
        self.modified_time = modified_time;
        self
    }

    /// Replace the MIME type
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Native documents (spreadsheets, slides, ...) have no downloadable
    /// bytes and can only be exported, so they are never synchronized.
    pub fn is_native_document(&self) -> bool {
        !self.is_directory
            && self
                .mime_type
                .as_deref()
                .is_some_and(|m| m.starts_with(NATIVE_MIME_PREFIX))
    }
}

// ============================================================================
// ChangeEvent
// ============================================================================

/// A single entry of the remote change feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub file_id: RemoteId,
    pub deleted: bool,
    /// Current metadata; `None` for permanently deleted objects
    pub file: Option<RemoteObject>,
}

impl ChangeEvent {
    /// A change carrying the object's new state
    pub fn modified(file: RemoteObject) -> Self {
        Self {
            file_id: file.id.clone(),
            deleted: false,
            file: Some(file),
        }
    }

    /// A permanent deletion
    pub fn deleted(file_id: RemoteId) -> Self {
        Self {
            file_id,
            deleted: true,
            file: None,
        }
    }

    /// True when the object is gone from the user's point of view: deleted,
    /// missing metadata, or moved to the trash.
    pub fn is_removal(&self) -> bool {
        self.deleted || self.file.as_ref().map_or(true, |f| f.is_trashed)
    }
}

// ============================================================================
// RemoteChangeSet
// ============================================================================

/// All change events since a revision, plus the largest revision seen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteChangeSet {
    pub changes: Vec<ChangeEvent>,
    pub largest_revision_id: i64,
}

impl RemoteChangeSet {
    pub fn new(changes: Vec<ChangeEvent>, largest_revision_id: i64) -> Self {
        Self {
            changes,
            largest_revision_id,
        }
    }

    /// Keep only the events observed after `since`.
    ///
    /// Events without metadata cannot be dated and are always kept. This
    /// suppresses the echo of this client's own writes that were already
    /// folded into the index.
    #[must_use]
    pub fn modified_after(mut self, since: DateTime<Utc>) -> Self {
        self.changes
            .retain(|ch| ch.file.as_ref().map_or(true, |f| f.modified_time > since));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Ids of every object mentioned by the feed
    pub fn touched_ids(&self) -> BTreeSet<RemoteId> {
        self.changes.iter().map(|ch| ch.file_id.clone()).collect()
    }

    /// Ids of objects removed (deleted or trashed), files and folders alike
    pub fn removed_ids(&self) -> BTreeSet<RemoteId> {
        self.changes
            .iter()
            .filter(|ch| ch.is_removal())
            .map(|ch| ch.file_id.clone())
            .collect()
    }

    /// Folders that were created, renamed, moved or otherwise updated
    pub fn modified_dirs(&self) -> impl Iterator<Item = &RemoteObject> {
        self.live_objects().filter(|f| f.is_directory)
    }

    /// Files with downloadable content that were created or updated
    pub fn modified_files(&self) -> impl Iterator<Item = &RemoteObject> {
        self.live_objects()
            .filter(|f| !f.is_directory && !f.is_native_document())
    }

    /// Native documents in the feed, skipped by content synchronization
    pub fn native_documents(&self) -> impl Iterator<Item = &RemoteObject> {
        self.live_objects().filter(|f| f.is_native_document())
    }

    fn live_objects(&self) -> impl Iterator<Item = &RemoteObject> {
        self.changes
            .iter()
            .filter(|ch| !ch.is_removal())
            .filter_map(|ch| ch.file.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn id(s: &str) -> RemoteId {
        RemoteId::new(s).unwrap()
    }

    fn file(i: &str) -> RemoteObject {
        RemoteObject::file(id(i), format!("{i}.txt"), RemoteId::root_alias(), None)
    }

    #[test]
    fn native_documents_are_detected() {
        let doc = file("d").with_mime_type("application/vnd.google-apps.document");
        assert!(doc.is_native_document());

        let plain = file("p").with_mime_type("text/plain");
        assert!(!plain.is_native_document());

        let folder = RemoteObject::directory(id("f"), "f", RemoteId::root_alias());
        assert!(!folder.is_native_document());
    }

    #[test]
    fn trashed_and_missing_files_count_as_removals() {
        let mut trashed = file("t");
        trashed.is_trashed = true;

        let missing = ChangeEvent {
            file_id: id("m"),
            deleted: false,
            file: None,
        };

        let set = RemoteChangeSet::new(
            vec![
                ChangeEvent::modified(trashed),
                missing,
                ChangeEvent::deleted(id("x")),
                ChangeEvent::modified(file("live")),
            ],
            10,
        );

        let removed: Vec<_> = set.removed_ids().into_iter().collect();
        assert_eq!(removed, vec![id("m"), id("t"), id("x")]);
        assert_eq!(set.modified_files().count(), 1);
        assert_eq!(set.touched_ids().len(), 4);
    }

    #[test]
    fn classification_splits_dirs_files_and_native_docs() {
        let set = RemoteChangeSet::new(
            vec![
                ChangeEvent::modified(RemoteObject::directory(id("d"), "d", RemoteId::root_alias())),
                ChangeEvent::modified(file("f")),
                ChangeEvent::modified(
                    file("g").with_mime_type("application/vnd.google-apps.spreadsheet"),
                ),
            ],
            3,
        );

        assert_eq!(set.modified_dirs().map(|o| o.id.as_str()).collect::<Vec<_>>(), vec!["d"]);
        assert_eq!(set.modified_files().map(|o| o.id.as_str()).collect::<Vec<_>>(), vec!["f"]);
        assert_eq!(set.native_documents().count(), 1);
    }

    #[test]
    fn modified_after_drops_older_events_but_keeps_undated() {
        let now = Utc::now();
        let old = file("old").with_modified_time(now - Duration::hours(1));
        let new = file("new").with_modified_time(now + Duration::seconds(5));

        let set = RemoteChangeSet::new(
            vec![
                ChangeEvent::modified(old),
                ChangeEvent::modified(new),
                ChangeEvent::deleted(id("gone")),
            ],
            7,
        )
        .modified_after(now);

        let ids: Vec<_> = set.touched_ids().into_iter().collect();
        assert_eq!(ids, vec![id("gone"), id("new")]);
        assert_eq!(set.largest_revision_id, 7);
    }
}
