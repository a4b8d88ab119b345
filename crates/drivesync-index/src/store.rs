//! Metadata directory persistence
//!
//! All state of a synchronized home lives in `<home>/.drivesync/`:
//!
//! | file | content |
//! |------|---------|
//! | `remote_index.json` | [`RemoteIndex`] snapshot |
//! | `local_journal.json` | [`LocalJournal`] paths |
//! | `config.yaml` | user configuration |
//! | `ignore.txt`, `remote_ignore.txt` | ignore patterns |
//! | `credentials.json` | OAuth tokens |
//! | `tmp/` | download staging area |
//!
//! Snapshots are written to a sibling temp file and renamed into place. In
//! simulation mode nothing is written.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::journal::LocalJournal;
use crate::remote_index::RemoteIndex;
use crate::IndexError;

/// Name of the metadata directory inside a synchronized home
pub const METADATA_DIR_NAME: &str = ".drivesync";

const INDEX_FILE: &str = "remote_index.json";
const JOURNAL_FILE: &str = "local_journal.json";
/// Name of the OAuth credentials file inside the metadata directory
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";
const IGNORE_FILE: &str = "ignore.txt";
const REMOTE_IGNORE_FILE: &str = "remote_ignore.txt";
const TMP_DIR: &str = "tmp";

/// Access to the files of one metadata directory
#[derive(Debug, Clone)]
pub struct MetadataStore {
    home: PathBuf,
    dir: PathBuf,
    simulation: bool,
}

impl MetadataStore {
    /// Open the metadata directory of an already synchronized home
    pub fn open(home: &Path) -> Result<Self, IndexError> {
        let dir = home.join(METADATA_DIR_NAME);
        if !dir.is_dir() {
            return Err(IndexError::NotInitialized(dir));
        }
        Ok(Self {
            home: home.to_path_buf(),
            dir,
            simulation: false,
        })
    }

    /// Prepare the metadata directory for a fresh clone.
    ///
    /// The directory may already hold configuration and credentials (from
    /// `login`), but not an index.
    pub fn init(home: &Path, simulation: bool) -> Result<Self, IndexError> {
        let dir = home.join(METADATA_DIR_NAME);
        if dir.join(INDEX_FILE).exists() {
            return Err(IndexError::AlreadyInitialized(dir));
        }
        if !simulation && !dir.is_dir() {
            fs::create_dir_all(&dir).map_err(|source| IndexError::Io {
                path: dir.clone(),
                source,
            })?;
            info!(dir = %dir.display(), "Initialized metadata directory");
        }
        Ok(Self {
            home: home.to_path_buf(),
            dir,
            simulation,
        })
    }

    /// Create `<home>/.drivesync` if needed, without requiring an index.
    /// Used by `login`, which may run before the first clone.
    pub fn ensure_dir(home: &Path) -> Result<PathBuf, IndexError> {
        let dir = home.join(METADATA_DIR_NAME);
        fs::create_dir_all(&dir).map_err(|source| IndexError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Suppress every write when `simulation` is set
    #[must_use]
    pub fn with_simulation(mut self, simulation: bool) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_simulation(&self) -> bool {
        self.simulation
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE_NAME)
    }

    pub fn ignore_path(&self) -> PathBuf {
        self.dir.join(IGNORE_FILE)
    }

    pub fn remote_ignore_path(&self) -> PathBuf {
        self.dir.join(REMOTE_IGNORE_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.dir.join(JOURNAL_FILE)
    }

    /// Staging directory for downloads, created on demand
    pub fn tmp_dir(&self) -> Result<PathBuf, IndexError> {
        let tmp = self.dir.join(TMP_DIR);
        fs::create_dir_all(&tmp).map_err(|source| IndexError::Io {
            path: tmp.clone(),
            source,
        })?;
        Ok(tmp)
    }

    pub fn has_index(&self) -> bool {
        self.index_path().is_file()
    }

    // ------------------------------------------------------------------------
    // Index
    // ------------------------------------------------------------------------

    pub fn load_index(&self) -> Result<RemoteIndex, IndexError> {
        let path = self.index_path();
        let index: RemoteIndex = read_json(&path)?;
        index.tree.validate()?;
        debug!(
            revision = index.last_revision_id,
            entries = index.tree.len(),
            "Loaded remote index"
        );
        Ok(index)
    }

    pub fn save_index(&self, index: &RemoteIndex) -> Result<(), IndexError> {
        if self.simulation {
            debug!("Simulation: not saving remote index");
            return Ok(());
        }
        write_json_atomic(&self.index_path(), index)?;
        debug!(revision = index.last_revision_id, "Saved remote index");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------------

    /// Load the journal; a missing file is an empty journal
    pub fn load_journal(&self) -> Result<LocalJournal, IndexError> {
        let path = self.journal_path();
        if !path.exists() {
            return Ok(LocalJournal::new());
        }
        read_json(&path)
    }

    pub fn save_journal(&self, journal: &LocalJournal) -> Result<(), IndexError> {
        if self.simulation {
            debug!("Simulation: not saving local journal");
            return Ok(());
        }
        write_json_atomic(&self.journal_path(), journal)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    let bytes = fs::read(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| IndexError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let bytes = serde_json::to_vec(value).map_err(|source| IndexError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })
}
