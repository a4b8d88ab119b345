//! Status command - Show pending local and remote changes

use anyhow::{Context, Result};
use clap::Args;

use drivesync_sync::{status, RemoteEntry, StatusOptions, StatusReport};

use super::{CommandContext, CommandStatus};
use crate::output::Output;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only report local changes, without querying the drive
    #[arg(long)]
    pub local_only: bool,

    /// List remote changes since this revision instead of the last pull
    #[arg(long, value_name = "ID")]
    pub revision: Option<i64>,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<CommandStatus> {
        let out = ctx.output();
        let ws = ctx.workspace()?;
        let options = StatusOptions {
            local_only: self.local_only,
            revision: self.revision,
        };
        let report = status(&ws, options).await.context("Status failed")?;

        if ctx.is_json() {
            out.report(&report)?;
        } else {
            show(&out, &report);
        }
        Ok(CommandStatus::Done)
    }
}

fn show(out: &Output, report: &StatusReport) {
    out.success(&format!(
        "{} at revision {} (last sync {})",
        report.home.display(),
        report.revision,
        report.last_sync.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    let local = &report.local;
    if local.is_empty() {
        out.info("No local changes");
    } else {
        out.info("Local changes:");
        for path in local.modified.keys() {
            out.info(&format!("  modified: {}", path.display()));
        }
        for path in &local.new {
            out.info(&format!("  new:      {}", path.display()));
        }
        for path in local.deleted.keys() {
            out.info(&format!("  deleted:  {}", path.display()));
        }
        for moved in &local.moved {
            out.info(&format!(
                "  moved:    {} -> {}",
                moved.from.display(),
                moved.to.display()
            ));
        }
    }

    let Some(remote) = &report.remote else {
        return;
    };
    if remote.modified.is_empty() && remote.deleted.is_empty() {
        out.info(&format!("No remote changes since revision {}", remote.since_revision));
        return;
    }
    out.info(&format!(
        "Remote changes since revision {} (now {}):",
        remote.since_revision, remote.largest_revision
    ));
    for entry in &remote.modified {
        out.info(&format!("  modified: {}", describe(entry)));
    }
    for entry in &remote.deleted {
        out.info(&format!("  deleted:  {}", describe(entry)));
    }
}

fn describe(entry: &RemoteEntry) -> String {
    match (&entry.path, &entry.title) {
        (Some(path), _) => path.display().to_string(),
        (None, Some(title)) => format!("{title} (id {}, outside the home)", entry.id),
        (None, None) => format!("id {}", entry.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivesync_core::domain::RemoteId;
    use std::path::PathBuf;

    #[test]
    fn test_describe_prefers_local_path() {
        let entry = RemoteEntry {
            id: RemoteId::new("f1").unwrap(),
            path: Some(PathBuf::from("docs/a.txt")),
            title: Some("a.txt".into()),
        };
        assert_eq!(describe(&entry), "docs/a.txt");

        let entry = RemoteEntry {
            path: None,
            ..entry
        };
        assert_eq!(describe(&entry), "a.txt (id f1, outside the home)");
    }
}
