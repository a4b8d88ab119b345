//! Local filesystem adapter
//!
//! Everything the reconcilers do to the synchronized home goes through
//! [`LocalFileSystem`]. Paths handed in and out are relative to the home;
//! absolute paths never leave this module.
//!
//! ## Design Decisions
//!
//! - **Blocking walk**: the tree walk uses `walkdir` on a blocking thread and
//!   hands back a plain list; the control thread never blocks on metadata.
//! - **Atomic replace**: downloads are staged under the metadata `tmp/` dir
//!   (same filesystem as the home) and renamed into place.
//! - **Conservative deletes**: directories are only removed when empty.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use drivesync_index::METADATA_DIR_NAME;

use crate::{Result, SyncError};

// ============================================================================
// Ignore rules
// ============================================================================

/// Patterns of editor lock files that are never uploaded
pub const LOCAL_DEFAULT_IGNORES: &[&str] = &[r"^\.~.*#$", r"^~\$.*"];

/// A list of regular expressions matched against names and relative paths
///
/// A pattern ignores an entry when it matches anywhere in the entry's file
/// name or anywhere in its home-relative path (with `/` separators).
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Regex>,
}

impl IgnoreRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile patterns; `origin` only names the source in errors
    pub fn from_patterns<I, S>(patterns: I, origin: &Path) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            let regex = Regex::new(pattern).map_err(|source| SyncError::IgnorePattern {
                file: origin.to_path_buf(),
                pattern: pattern.to_string(),
                source,
            })?;
            compiled.push(regex);
        }
        Ok(Self { patterns: compiled })
    }

    /// Load one pattern per line from `path`, after the given defaults.
    ///
    /// A missing file yields just the defaults.
    pub fn load(path: &Path, defaults: &[&str]) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(SyncError::local_io(path)(e)),
        };
        let rules = Self::from_patterns(
            defaults.iter().copied().chain(content.lines()),
            path,
        )?;
        debug!(file = %path.display(), patterns = rules.len(), "Loaded ignore rules");
        Ok(rules)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if any pattern matches the file name or the relative path
    pub fn is_ignored(&self, relative: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        let full = slash_path(relative);
        self.patterns
            .iter()
            .any(|p| p.is_match(&name) || p.is_match(&full))
    }

    /// True if the path or any of its ancestors is ignored
    pub fn covers(&self, relative: &Path) -> bool {
        relative
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| self.is_ignored(p))
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// LocalFileSystem
// ============================================================================

/// A regular file found under the home
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}

/// Result of removing a path that the remote no longer has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    Missing,
    /// A directory that still holds untracked entries
    KeptNonEmpty,
}

/// Filesystem operations rooted at a synchronized home
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    home: PathBuf,
}

impl LocalFileSystem {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.home.join(relative)
    }

    /// Express a user-supplied path relative to the home.
    ///
    /// Relative inputs are taken as relative to the home already.
    pub fn relative(&self, path: &Path) -> Result<PathBuf> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.home)
                .map_err(|_| SyncError::OutsideHome(path.to_path_buf()))?
                .to_path_buf()
        } else {
            path.to_path_buf()
        };
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(SyncError::OutsideHome(path.to_path_buf()));
        }
        Ok(relative
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect())
    }

    pub async fn exists(&self, relative: &Path) -> bool {
        tokio::fs::try_exists(self.absolute(relative))
            .await
            .unwrap_or(false)
    }

    pub async fn is_dir(&self, relative: &Path) -> bool {
        tokio::fs::metadata(self.absolute(relative))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Every regular file under the home that is not ignored.
    ///
    /// The metadata directory and ignored directories are not descended.
    #[instrument(skip(self, ignores), fields(home = %self.home.display()))]
    pub async fn scan(&self, ignores: &IgnoreRules) -> Result<Vec<LocalEntry>> {
        let home = self.home.clone();
        let ignores = ignores.clone();
        let entries = tokio::task::spawn_blocking(move || walk(&home, &ignores)).await??;
        debug!(files = entries.len(), "Scanned home");
        Ok(entries)
    }

    pub async fn read(&self, relative: &Path) -> Result<Vec<u8>> {
        let path = self.absolute(relative);
        tokio::fs::read(&path).await.map_err(SyncError::local_io(path))
    }

    /// Create a directory and its parents; false if it already existed
    pub async fn create_dir(&self, relative: &Path) -> Result<bool> {
        let path = self.absolute(relative);
        if self.is_dir(relative).await {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(SyncError::local_io(&path))?;
        debug!(path = %relative.display(), "Created directory");
        Ok(true)
    }

    /// Move a staged file over `relative`, creating parent directories
    pub async fn replace_file(&self, staged: &Path, relative: &Path) -> Result<()> {
        let target = self.absolute(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(SyncError::local_io(parent))?;
        }
        tokio::fs::rename(staged, &target)
            .await
            .map_err(SyncError::local_io(&target))?;
        debug!(path = %relative.display(), "Replaced file");
        Ok(())
    }

    /// Rename inside the home, creating the destination's parents
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let target = self.absolute(to);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(SyncError::local_io(parent))?;
        }
        tokio::fs::rename(self.absolute(from), &target)
            .await
            .map_err(SyncError::local_io(&target))?;
        debug!(from = %from.display(), to = %to.display(), "Renamed");
        Ok(())
    }

    /// Remove a file, or a directory if it is empty
    pub async fn remove(&self, relative: &Path) -> Result<Removal> {
        let path = self.absolute(relative);
        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Removal::Missing),
            Err(e) => return Err(SyncError::local_io(path)(e)),
        };

        if metadata.is_dir() {
            let mut entries = tokio::fs::read_dir(&path)
                .await
                .map_err(SyncError::local_io(&path))?;
            if entries
                .next_entry()
                .await
                .map_err(SyncError::local_io(&path))?
                .is_some()
            {
                warn!(path = %relative.display(), "Directory deleted remotely is not empty, keeping it");
                return Ok(Removal::KeptNonEmpty);
            }
            tokio::fs::remove_dir(&path)
                .await
                .map_err(SyncError::local_io(&path))?;
        } else {
            tokio::fs::remove_file(&path)
                .await
                .map_err(SyncError::local_io(&path))?;
        }
        debug!(path = %relative.display(), "Removed");
        Ok(Removal::Removed)
    }

    /// Set the modification time of an absolute path
    pub async fn set_modified(path: &Path, time: DateTime<Utc>) -> Result<()> {
        let owned = path.to_path_buf();
        let when = SystemTime::from(time);
        tokio::task::spawn_blocking(move || {
            std::fs::File::options()
                .write(true)
                .open(&owned)
                .and_then(|f| f.set_modified(when))
        })
        .await?
        .map_err(SyncError::local_io(path))
    }
}

fn walk(home: &Path, ignores: &IgnoreRules) -> Result<Vec<LocalEntry>> {
    let mut out = Vec::new();
    let walker = WalkDir::new(home)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let Ok(relative) = entry.path().strip_prefix(home) else {
                return false;
            };
            if relative == Path::new(METADATA_DIR_NAME) {
                return false;
            }
            !ignores.is_ignored(relative)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| home.to_path_buf());
                return Err(SyncError::LocalIo {
                    path,
                    source: e.into(),
                });
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| SyncError::LocalIo {
            path: entry.path().to_path_buf(),
            source: e.into(),
        })?;
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        if let Ok(relative) = entry.path().strip_prefix(home) {
            out.push(LocalEntry {
                path: relative.to_path_buf(),
                modified,
            });
        }
    }
    Ok(out)
}
