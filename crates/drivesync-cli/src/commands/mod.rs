//! CLI subcommands
//!
//! Every command receives a [`CommandContext`] holding what is loaded once
//! at process start: the resolved home, the validated configuration and the
//! output format. Remote connections and workspaces are opened on demand,
//! since `login` and `put` need neither an index nor credentials up front.

pub mod clone;
pub mod index;
pub mod info;
pub mod login;
pub mod put;
pub mod reset;
pub mod status;
pub mod sync;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::debug;

use drivesync_core::config::Config;
use drivesync_core::ports::IRemoteStore;
use drivesync_drive::DriveRemoteStore;
use drivesync_index::{CREDENTIALS_FILE_NAME, METADATA_DIR_NAME};
use drivesync_sync::{SyncOptions, Workspace};

use crate::output::{Output, OutputFormat};

/// How a command finished when it did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Done,
    /// A conflict or staleness report stopped the command
    Refused,
}

/// Process-wide state shared by all commands
#[derive(Debug)]
pub struct CommandContext {
    pub home: PathBuf,
    pub config: Config,
    pub simulation: bool,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Resolve `home` and load `<home>/.drivesync/config.yaml`.
    ///
    /// A missing configuration file yields defaults; an unreadable or
    /// invalid one is an error.
    pub fn new(home: &Path, simulation: bool, format: OutputFormat) -> Result<Self> {
        let home = absolute(home)?;
        let config_path = Config::path_in(&home.join(METADATA_DIR_NAME));
        let config = if config_path.exists() {
            Config::load(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?
        } else {
            Config::default()
        };

        let errors = config.validate();
        if !errors.is_empty() {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            bail!(
                "Invalid configuration in {}: {}",
                config_path.display(),
                details.join("; ")
            );
        }

        Ok(Self {
            home,
            config,
            simulation,
            format,
        })
    }

    pub fn output(&self) -> Output {
        Output::new(self.format)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.home.join(METADATA_DIR_NAME).join(CREDENTIALS_FILE_NAME)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::from_config(&self.config.sync, self.simulation)
    }

    /// Connect to the drive with the stored credentials
    pub fn remote(&self) -> Result<Arc<dyn IRemoteStore>> {
        let store = DriveRemoteStore::connect(&self.config, &self.credentials_path())?;
        Ok(Arc::new(store))
    }

    /// Open the synchronized home: index, journal, ignore rules and remote
    pub fn workspace(&self) -> Result<Workspace> {
        let remote = self.remote()?;
        let ws = Workspace::open(&self.home, remote, self.sync_options())
            .with_context(|| format!("Failed to open {}", self.home.display()))?;
        Ok(ws)
    }

    /// Resolve a user-supplied path against the working directory
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        absolute(path)
    }
}

/// `path` made absolute against the working directory, without `.` parts
pub fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read the working directory")?
            .join(path)
    };
    let cleaned: PathBuf = joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    debug!(input = %path.display(), resolved = %cleaned.display(), "Resolved path");
    Ok(cleaned)
}
