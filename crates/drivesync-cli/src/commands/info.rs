//! Info command - Look up one entry in the index

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use drivesync_core::domain::RemoteId;
use drivesync_sync::{info, InfoQuery};

use super::{CommandContext, CommandStatus};

#[derive(Debug, Args)]
#[command(group = clap::ArgGroup::new("target").required(true).args(["path", "id"]))]
pub struct InfoCommand {
    /// Local path inside the home
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Remote id
    #[arg(long)]
    pub id: Option<String>,

    /// Also fetch live metadata from the drive
    #[arg(long)]
    pub full: bool,
}

impl InfoCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<CommandStatus> {
        let out = ctx.output();
        let query = match (&self.path, &self.id) {
            (Some(path), _) => InfoQuery::Path(ctx.resolve(path)?),
            (None, Some(id)) => InfoQuery::Id(RemoteId::new(id.as_str())?),
            (None, None) => anyhow::bail!("either --path or --id is required"),
        };

        let ws = ctx.workspace()?;
        let report = info(&ws, query, self.full).await.context("Lookup failed")?;

        if ctx.is_json() {
            out.report(&report)?;
            return Ok(CommandStatus::Done);
        }

        match (&report.id, &report.path) {
            (Some(id), Some(path)) if report.indexed => {
                out.success(&format!("{} is indexed", path.display()));
                out.info(&format!("id:   {id}"));
            }
            (_, Some(path)) => out.warn(&format!("{} is not in the index", path.display())),
            (Some(id), None) => out.warn(&format!("{id} is not in the index")),
            (None, None) => out.warn("Nothing matched"),
        }

        if let Some(remote) = &report.remote {
            out.info(&format!("title:    {}", remote.title));
            out.info(&format!("parent:   {}", remote.parent_id));
            out.info(&format!(
                "type:     {}",
                remote.mime_type.as_deref().unwrap_or("unknown")
            ));
            out.info(&format!("modified: {}", remote.modified_time.to_rfc3339()));
            if let Some(hash) = &remote.content_hash {
                out.info(&format!("md5:      {hash}"));
            }
            if remote.is_trashed {
                out.warn("The object is in the trash");
            }
        }
        Ok(CommandStatus::Done)
    }
}
