//! Reset command - Discard local changes and restore the indexed state

use anyhow::{Context, Result};
use clap::Args;

use drivesync_sync::reset;

use super::{CommandContext, CommandStatus};

#[derive(Debug, Args)]
pub struct ResetCommand;

impl ResetCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<CommandStatus> {
        let out = ctx.output();
        let mut ws = ctx.workspace()?;
        let summary = reset(&mut ws).await.context("Reset failed")?;

        if ctx.is_json() {
            out.report(&summary)?;
            return Ok(CommandStatus::Done);
        }

        let changes = summary.restored.len()
            + summary.recreated_dirs.len()
            + summary.moved_back.len()
            + summary.deleted_new.len();
        if changes == 0 {
            out.success("No local changes to reset");
            return Ok(CommandStatus::Done);
        }

        out.success("Local changes discarded");
        for path in &summary.recreated_dirs {
            out.info(&format!("+ {}/", path.display()));
        }
        for path in &summary.restored {
            out.info(&format!("< {}", path.display()));
        }
        for (from, to) in &summary.moved_back {
            out.info(&format!("> {} -> {}", from.display(), to.display()));
        }
        for path in &summary.deleted_new {
            out.info(&format!("- {}", path.display()));
        }
        Ok(CommandStatus::Done)
    }
}
