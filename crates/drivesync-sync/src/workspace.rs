//! Per-command synchronization context
//!
//! A [`Workspace`] is assembled once at the start of a command: metadata
//! store, index snapshot, journal, ignore rules and the remote store. The
//! reconcilers borrow it mutably; nothing in it is loaded lazily.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use drivesync_core::config::SyncConfig;
use drivesync_core::domain::RemoteId;
use drivesync_core::ports::IRemoteStore;
use drivesync_index::{LocalJournal, MetadataStore, RemoteIndex};

use crate::filesystem::{IgnoreRules, LocalFileSystem, LOCAL_DEFAULT_IGNORES};
use crate::Result;

/// Prefix of ids handed out instead of real remote ids in simulation mode
pub const SIMULATED_ID_PREFIX: &str = "simulated-";

/// Knobs shared by all reconcilers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Compute and report, but change nothing remote or local
    pub simulation: bool,
    /// Upper bound of concurrent transfers
    pub transfer_concurrency: usize,
    /// Ids per batched metadata request
    pub metadata_batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            simulation: false,
            transfer_concurrency: 8,
            metadata_batch_size: 100,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig, simulation: bool) -> Self {
        Self {
            simulation,
            transfer_concurrency: config.transfer_concurrency.max(1),
            metadata_batch_size: config.metadata_batch_size.max(1),
        }
    }
}

/// Loaded state of one synchronized home
pub struct Workspace {
    store: MetadataStore,
    pub index: RemoteIndex,
    pub journal: LocalJournal,
    remote: Arc<dyn IRemoteStore>,
    fs: LocalFileSystem,
    ignores: IgnoreRules,
    remote_ignores: IgnoreRules,
    options: SyncOptions,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("home", &self.fs.home())
            .field("revision", &self.index.last_revision_id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Load an already cloned home
    pub fn open(home: &Path, remote: Arc<dyn IRemoteStore>, options: SyncOptions) -> Result<Self> {
        let store = MetadataStore::open(home)?.with_simulation(options.simulation);
        let index = store.load_index()?;
        let journal = store.load_journal()?;
        info!(
            home = %home.display(),
            revision = index.last_revision_id,
            entries = index.tree.len(),
            pending = journal.len(),
            "Opened workspace"
        );
        Self::assemble(store, index, journal, remote, options)
    }

    /// Wrap freshly initialized state (used by clone)
    pub fn from_parts(
        store: MetadataStore,
        index: RemoteIndex,
        remote: Arc<dyn IRemoteStore>,
        options: SyncOptions,
    ) -> Result<Self> {
        let store = store.with_simulation(options.simulation);
        Self::assemble(store, index, LocalJournal::new(), remote, options)
    }

    fn assemble(
        store: MetadataStore,
        index: RemoteIndex,
        journal: LocalJournal,
        remote: Arc<dyn IRemoteStore>,
        options: SyncOptions,
    ) -> Result<Self> {
        let ignores = IgnoreRules::load(&store.ignore_path(), LOCAL_DEFAULT_IGNORES)?;
        let remote_ignores = IgnoreRules::load(&store.remote_ignore_path(), &[])?;
        Ok(Self {
            fs: LocalFileSystem::new(store.home()),
            store,
            index,
            journal,
            remote,
            ignores,
            remote_ignores,
            options,
        })
    }

    pub fn home(&self) -> &Path {
        self.fs.home()
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn remote(&self) -> &dyn IRemoteStore {
        self.remote.as_ref()
    }

    pub fn fs(&self) -> &LocalFileSystem {
        &self.fs
    }

    pub fn ignores(&self) -> &IgnoreRules {
        &self.ignores
    }

    pub fn remote_ignores(&self) -> &IgnoreRules {
        &self.remote_ignores
    }

    pub fn options(&self) -> SyncOptions {
        self.options
    }

    pub fn is_simulation(&self) -> bool {
        self.options.simulation
    }

    /// Save index and journal (no-op in simulation)
    pub fn persist(&self) -> Result<()> {
        self.store.save_index(&self.index)?;
        self.store.save_journal(&self.journal)?;
        Ok(())
    }

    pub fn save_journal(&self) -> Result<()> {
        self.store.save_journal(&self.journal)?;
        Ok(())
    }

    /// Drop a path (and everything below it) from the index and persist.
    ///
    /// Returns the id the path mapped to; empty if the path is not indexed.
    pub fn remove_index_path(&mut self, path: &Path) -> Result<Vec<RemoteId>> {
        let relative = self.fs.relative(path)?;
        let removed = self.index.tree.remove_paths([&relative]);
        if removed.is_empty() {
            info!(path = %relative.display(), "Path is not in the index");
            return Ok(removed);
        }
        self.store.save_index(&self.index)?;
        info!(path = %relative.display(), ids = removed.len(), "Removed path from index");
        Ok(removed)
    }

    /// Id used in place of a real remote id when nothing is created
    pub(crate) fn simulated_id() -> Result<RemoteId> {
        let id = RemoteId::new(format!("{SIMULATED_ID_PREFIX}{}", Uuid::new_v4()))?;
        debug!(id = %id, "Simulated remote id");
        Ok(id)
    }
}
