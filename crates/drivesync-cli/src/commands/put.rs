//! Put command - Upload standalone files into a remote folder
//!
//! Needs credentials but no index: the files are neither tracked nor
//! required to live inside the home.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use drivesync_core::domain::RemoteId;
use drivesync_sync::put_files;

use super::{CommandContext, CommandStatus};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct PutCommand {
    /// Remote folder receiving the files
    #[arg(long, value_name = "ID")]
    pub parent_id: String,

    /// File to upload; repeatable
    #[arg(long = "path", value_name = "PATH", conflicts_with = "path_file")]
    pub paths: Vec<PathBuf>,

    /// File listing one path per line
    #[arg(long, value_name = "FILE")]
    pub path_file: Option<PathBuf>,
}

impl PutCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<CommandStatus> {
        let out = ctx.output();
        let parent_id = RemoteId::new(self.parent_id.as_str())?;
        let paths = match &self.path_file {
            Some(list) => read_path_file(list)?,
            None => self.paths.clone(),
        };
        if paths.is_empty() {
            bail!("nothing to upload: pass --path or --path-file");
        }
        let paths = paths
            .iter()
            .map(|p| ctx.resolve(p))
            .collect::<Result<Vec<_>>>()?;

        info!(parent = %parent_id, files = paths.len(), "Uploading files");
        let remote = ctx.remote()?;
        let entries = put_files(remote.as_ref(), &parent_id, paths, ctx.sync_options())
            .await
            .context("Upload failed")?;

        if ctx.is_json() {
            out.report(&entries)?;
            return Ok(CommandStatus::Done);
        }

        out.success(&format!("Uploaded {}", plural(entries.len(), "file")));
        for entry in &entries {
            out.info(&format!("{} -> {}", entry.path.display(), entry.object.id));
        }
        Ok(CommandStatus::Done)
    }
}

/// Non-empty, trimmed lines of `list`
fn read_path_file(list: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(list)
        .with_context(|| format!("Failed to read {}", list.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}
