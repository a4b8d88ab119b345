//! Index and remote lookups for a single entry

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, instrument};

use drivesync_core::domain::{RemoteId, RemoteObject};

use crate::workspace::Workspace;
use crate::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoQuery {
    Path(PathBuf),
    Id(RemoteId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoReport {
    pub id: Option<RemoteId>,
    pub path: Option<PathBuf>,
    pub indexed: bool,
    /// Live metadata, when requested
    pub remote: Option<RemoteObject>,
}

#[instrument(skip(ws))]
pub async fn info(ws: &Workspace, query: InfoQuery, full: bool) -> Result<InfoReport> {
    let tree = &ws.index.tree;
    let (id, path) = match query {
        InfoQuery::Path(path) => {
            let relative = ws.fs().relative(&path)?;
            (tree.find(&relative).cloned(), Some(relative))
        }
        InfoQuery::Id(id) => {
            let path = tree.path_of(&id);
            (Some(id), path)
        }
    };
    let indexed = id.as_ref().is_some_and(|id| tree.contains(id));

    let remote = match (&id, full) {
        (Some(id), true) => {
            debug!(id = %id, "Fetching remote metadata");
            Some(
                ws.remote()
                    .get_object(id)
                    .await
                    .map_err(SyncError::Remote)?,
            )
        }
        _ => None,
    };

    Ok(InfoReport {
        id,
        path,
        indexed,
        remote,
    })
}
