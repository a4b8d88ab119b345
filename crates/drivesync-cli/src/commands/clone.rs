//! Clone command - Mirror the drive into an empty home

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use drivesync_sync::clone_remote;

use super::{login, CommandContext, CommandStatus};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct CloneCommand;

impl CloneCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<CommandStatus> {
        let out = ctx.output();

        if !ctx.credentials_path().exists() {
            out.info("No stored credentials, logging in first");
            login::authorize(ctx).await?;
        }

        let remote = ctx.remote()?;
        out.info(&format!("Cloning drive into {}...", ctx.home.display()));
        let (_ws, summary) = clone_remote(&ctx.home, remote, ctx.sync_options())
            .await
            .context("Clone failed")?;
        info!(revision = summary.revision, files = summary.downloaded.len(), "Clone finished");

        if ctx.is_json() {
            out.report(&summary)?;
            return Ok(CommandStatus::Done);
        }

        out.success(&format!("Cloned at revision {}", summary.revision));
        out.info(&format!(
            "{}, {}",
            plural(summary.directories, "folder"),
            plural(summary.downloaded.len(), "file")
        ));
        for title in &summary.skipped_native {
            out.warn(&format!("Skipped native document '{title}'"));
        }
        if ctx.simulation {
            out.info("Simulation: nothing was written");
        }
        Ok(CommandStatus::Done)
    }
}
