//! Revision-stamped index snapshot
//!
//! [`RemoteIndex`] owns the [`IndexTree`] together with the revision of the
//! remote change feed it reflects and the time of the last synchronization.
//! Every remote change up to and including `last_revision_id` is reflected
//! in the tree.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use drivesync_core::domain::RemoteId;

use crate::tree::IndexTree;

/// Persisted synchronization state of one home directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIndex {
    pub last_sync_time_millis: i64,
    pub last_revision_id: i64,
    pub tree: IndexTree,
}

impl RemoteIndex {
    /// Fresh index for a drive, stamped with the current time
    pub fn new(root_id: RemoteId, last_revision_id: i64) -> Self {
        Self {
            last_sync_time_millis: Utc::now().timestamp_millis(),
            last_revision_id,
            tree: IndexTree::new(root_id),
        }
    }

    pub fn last_sync_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_sync_time_millis)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Record that a synchronization just happened
    pub fn touch_sync_time(&mut self) {
        self.last_sync_time_millis = Utc::now().timestamp_millis();
    }

    /// Advance the revision; lower values are ignored so the revision never
    /// moves backwards.
    pub fn advance_revision(&mut self, revision: i64) -> bool {
        if revision > self.last_revision_id {
            self.last_revision_id = revision;
            true
        } else {
            false
        }
    }
}
