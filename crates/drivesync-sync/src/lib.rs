//! drivesync Sync - Reconciliation engine
//!
//! Provides:
//! - Content checksumming of streamed transfers
//! - Local change detection with content-hash move detection
//! - Pull, push and reset reconcilers against an [`IRemoteStore`]
//! - Clone, status, info and put helpers used by the CLI
//!
//! ## Modules
//!
//! - [`checksum`] - MD5-computing reader/writer wrappers
//! - [`filesystem`] - Local filesystem adapter (walk, ignore rules, atomic replace)
//! - [`detector`] - [`LocalChangeSet`] construction
//! - [`workspace`] - Per-command state: index, journal, ignore rules, remote store
//! - [`transfer`] - Parallel verified downloads and uploads
//! - [`pull`], [`push`], [`reset`] - The reconcilers
//! - [`clone`], [`status`], [`info`], [`put`] - Supporting commands
//!
//! [`IRemoteStore`]: drivesync_core::ports::IRemoteStore
//! [`LocalChangeSet`]: detector::LocalChangeSet

pub mod checksum;
pub mod clone;
pub mod detector;
pub mod filesystem;
pub mod info;
pub mod pull;
pub mod push;
pub mod put;
pub mod reset;
pub mod status;
pub mod transfer;
pub mod workspace;

use std::path::PathBuf;

use thiserror::Error;

use drivesync_core::domain::{ContentHash, DomainError, RemoteId};
use drivesync_index::IndexError;

pub use clone::{clone_remote, CloneSummary};
pub use detector::{LocalChangeSet, LocalMove};
pub use filesystem::{IgnoreRules, LocalFileSystem};
pub use info::{info, InfoQuery, InfoReport};
pub use pull::{pull, ConflictKind, ConflictReport, PullOptions, PullOutcome, PullSummary};
pub use push::{push, PushOutcome, PushSummary};
pub use put::{put_files, PutEntry};
pub use reset::{reset, ResetSummary};
pub use status::{status, RemoteEntry, RemoteStatus, StatusOptions, StatusReport};
pub use workspace::{SyncOptions, Workspace};

/// Errors that can occur during synchronization operations
///
/// Conflicts and staleness are not errors: the reconcilers report them
/// through [`PullOutcome::Conflicted`] and [`PushOutcome::Stale`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An I/O error on a specific local path
    #[error("IO error on {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transferred content does not match the checksum the remote reports
    #[error("Checksum mismatch for {path} (id={id}): expected {expected}, found {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        id: RemoteId,
        expected: ContentHash,
        actual: ContentHash,
    },

    /// Index failure, including unresolved hierarchies
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The remote store failed
    #[error("Remote store error: {0:#}")]
    Remote(anyhow::Error),

    /// A new path's parent could neither be found nor created
    #[error("No remote parent for {0}")]
    UnresolvedParent(PathBuf),

    /// An ignore pattern is not a valid regular expression
    #[error("Invalid ignore pattern '{pattern}' in {file}: {source}")]
    IgnorePattern {
        file: PathBuf,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A path argument does not lie inside the synchronized home
    #[error("Path is outside the synchronized home: {0}")]
    OutsideHome(PathBuf),

    /// A domain-level error propagated from drivesync-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// A blocking filesystem task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result alias for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub(crate) fn local_io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| SyncError::LocalIo { path, source }
    }
}
