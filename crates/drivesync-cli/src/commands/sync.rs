//! Pull and push commands, and the default pull-then-push run
//!
//! Conflict and staleness reports are printed and turned into
//! [`CommandStatus::Refused`]; nothing else is treated as a failure.

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use drivesync_sync::{pull, push, PullOptions, PullOutcome, PushOutcome, Workspace};

use super::{CommandContext, CommandStatus};
use crate::output::{plural, Output};

#[derive(Debug, Args)]
pub struct PullCommand {
    /// Do not delete local files removed remotely
    #[arg(long)]
    pub ignore_deletes: bool,

    /// Do not download files created remotely
    #[arg(long)]
    pub ignore_new: bool,
}

impl PullCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<CommandStatus> {
        let mut ws = ctx.workspace()?;
        let options = PullOptions {
            ignore_deletes: self.ignore_deletes,
            ignore_new: self.ignore_new,
        };
        run_pull(ctx, &mut ws, options).await
    }
}

#[derive(Debug, Args)]
pub struct PushCommand;

impl PushCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<CommandStatus> {
        let mut ws = ctx.workspace()?;
        run_push(ctx, &mut ws).await
    }
}

/// `drivesync` without a subcommand: pull, then push if the pull went through
pub async fn sync_both(ctx: &CommandContext) -> Result<CommandStatus> {
    let mut ws = ctx.workspace()?;
    if run_pull(ctx, &mut ws, PullOptions::default()).await? == CommandStatus::Refused {
        warn!("Pull refused, skipping push");
        return Ok(CommandStatus::Refused);
    }
    run_push(ctx, &mut ws).await
}

async fn run_pull(
    ctx: &CommandContext,
    ws: &mut Workspace,
    options: PullOptions,
) -> Result<CommandStatus> {
    let out = ctx.output();
    let outcome = pull(ws, options).await.context("Pull failed")?;

    if ctx.is_json() {
        out.report(&outcome)?;
    } else {
        show_pull(&out, &outcome);
    }

    Ok(match outcome {
        PullOutcome::Conflicted(_) => CommandStatus::Refused,
        PullOutcome::UpToDate { .. } | PullOutcome::Pulled(_) => CommandStatus::Done,
    })
}

async fn run_push(ctx: &CommandContext, ws: &mut Workspace) -> Result<CommandStatus> {
    let out = ctx.output();
    let outcome = push(ws).await.context("Push failed")?;

    if ctx.is_json() {
        out.report(&outcome)?;
    } else {
        show_push(&out, &outcome);
    }

    Ok(match outcome {
        PushOutcome::Stale { .. } => CommandStatus::Refused,
        PushOutcome::NothingToPush | PushOutcome::Pushed(_) => CommandStatus::Done,
    })
}

fn show_pull(out: &Output, outcome: &PullOutcome) {
    match outcome {
        PullOutcome::UpToDate { revision } => {
            out.success(&format!("Already up to date (revision {revision})"));
        }
        PullOutcome::Conflicted(report) => {
            out.error(&format!("Pull aborted: {report}"));
            for path in &report.paths {
                out.info(&format!("! {}", path.display()));
            }
        }
        PullOutcome::Pulled(summary) => {
            info!(revision = summary.revision, "Pull applied");
            out.success(&format!("Pulled to revision {}", summary.revision));
            for path in &summary.created_dirs {
                out.info(&format!("+ {}/", path.display()));
            }
            for path in &summary.downloaded {
                out.info(&format!("< {}", path.display()));
            }
            for (from, to) in &summary.relocated {
                out.info(&format!("> {} -> {}", from.display(), to.display()));
            }
            for path in &summary.deleted {
                out.info(&format!("- {}", path.display()));
            }
            if !summary.kept.is_empty() {
                out.warn(&format!(
                    "Kept {} removed remotely but holding local data",
                    plural(summary.kept.len(), "path")
                ));
                for path in &summary.kept {
                    out.info(&format!("  {}", path.display()));
                }
            }
            for title in &summary.skipped_native {
                out.warn(&format!("Skipped native document '{title}'"));
            }
        }
    }
}

fn show_push(out: &Output, outcome: &PushOutcome) {
    match outcome {
        PushOutcome::NothingToPush => out.success("Nothing to push"),
        PushOutcome::Stale {
            local_revision,
            remote_revision,
        } => {
            out.error(&format!(
                "Remote changed since the last pull (local revision {local_revision}, remote {remote_revision}); pull first"
            ));
        }
        PushOutcome::Pushed(summary) => {
            out.success(&format!("Pushed, now at revision {}", summary.revision));
            for path in &summary.created_dirs {
                out.info(&format!("+ {}/", path.display()));
            }
            for path in &summary.uploaded {
                out.info(&format!("> {}", path.display()));
            }
            for path in &summary.updated {
                out.info(&format!("~ {}", path.display()));
            }
            for (from, to) in &summary.moved {
                out.info(&format!("> {} -> {}", from.display(), to.display()));
            }
            for path in &summary.trashed {
                out.info(&format!("- {}", path.display()));
            }
        }
    }
}
