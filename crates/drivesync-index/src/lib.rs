//! drivesync Index - Local state persistence
//!
//! File-backed state kept in the metadata directory of a synchronized home:
//! - The remote index tree mapping remote ids to local paths
//! - The last synchronized revision and sync time
//! - The journal of locally modified paths awaiting acknowledgement
//!
//! ## Architecture
//!
//! The tree is an arena of nodes keyed by remote id, each carrying an
//! explicit parent pointer and an ordered list of child ids. It is mutated
//! by the reconcilers on a single control thread; snapshots are plain
//! clones.
//!
//! ## Key Components
//!
//! - [`IndexTree`] - Arena tree with path derivation and batch reconciliation
//! - [`RemoteIndex`] - Tree plus revision bookkeeping, persisted as JSON
//! - [`LocalJournal`] - Durable set of locally modified paths
//! - [`MetadataStore`] - Load/save of the above under `<home>/.drivesync`
//! - [`IndexError`] - Error types for index operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use drivesync_index::MetadataStore;
//!
//! # fn example() -> anyhow::Result<()> {
//! let store = MetadataStore::open(Path::new("/home/user/drive"))?;
//! let index = store.load_index()?;
//! println!("at revision {}", index.last_revision_id);
//! # Ok(())
//! # }
//! ```

pub mod journal;
pub mod remote_index;
pub mod store;
pub mod tree;

use std::path::PathBuf;

use drivesync_core::domain::RemoteId;

pub use journal::LocalJournal;
pub use remote_index::RemoteIndex;
pub use store::{MetadataStore, CREDENTIALS_FILE_NAME, METADATA_DIR_NAME};
pub use tree::{IndexNode, IndexTree};

/// Errors that can occur during index operations
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A reconciliation batch referenced parents that are neither in the
    /// tree nor in the batch, or would have detached nodes from the root
    #[error("Could not resolve hierarchy for {}", format_ids(.ids))]
    UnresolvedHierarchy { ids: Vec<RemoteId> },

    /// A persisted snapshot is structurally inconsistent
    #[error("Corrupt index: {0}")]
    Corrupt(String),

    /// The metadata directory does not exist (home was never cloned)
    #[error("Not a synchronized directory (no {0})")]
    NotInitialized(PathBuf),

    /// The metadata directory already holds an index where a fresh one was expected
    #[error("Already initialized: {0} already holds an index")]
    AlreadyInitialized(PathBuf),

    /// Reading or writing state files failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization of state files failed
    #[error("Serialization error in {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn format_ids(ids: &[RemoteId]) -> String {
    ids.iter()
        .map(RemoteId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
