//! Index commands - Administrative edits of the remote index

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use super::{CommandContext, CommandStatus};

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Forget a path (and everything below it) without touching files
    RemovePath {
        /// Path inside the home
        path: PathBuf,
    },
}

impl IndexCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<CommandStatus> {
        match self {
            IndexCommand::RemovePath { path } => remove_path(ctx, path).await,
        }
    }
}

async fn remove_path(ctx: &CommandContext, path: &Path) -> Result<CommandStatus> {
    let out = ctx.output();
    let target = ctx.resolve(path)?;
    let mut ws = ctx.workspace()?;
    let removed = ws
        .remove_index_path(&target)
        .with_context(|| format!("Failed to remove {} from the index", path.display()))?;

    if ctx.is_json() {
        out.report(&serde_json::json!({
            "path": path,
            "removed": removed,
        }))?;
    } else if removed.is_empty() {
        out.warn(&format!("{} is not in the index", path.display()));
    } else {
        out.success(&format!(
            "Removed {} from the index ({} entries)",
            path.display(),
            removed.len()
        ));
    }
    Ok(CommandStatus::Done)
}
