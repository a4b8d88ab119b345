//! Drive v2 wire types
//!
//! Deserialization targets for the JSON the API returns, request bodies for
//! metadata writes, and the conversions into domain objects. Only the
//! fields selected by [`FILE_FIELDS`] are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use drivesync_core::domain::{
    ChangeEvent, ContentHash, RemoteId, RemoteObject, FOLDER_MIME_TYPE,
};
use drivesync_core::ports::{MetadataPatch, NewObject};

use crate::DriveError;

/// Partial-response selector for every file resource request
pub const FILE_FIELDS: &str =
    "id,title,parents(id),version,mimeType,modifiedDate,md5Checksum,labels(trashed)";

// ============================================================================
// Responses
// ============================================================================

/// `GET /about`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    #[serde(deserialize_with = "int64")]
    pub largest_change_id: i64,
    pub root_folder_id: String,
}

/// A file or folder resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub parents: Vec<ParentReference>,
    pub mime_type: Option<String>,
    pub modified_date: Option<DateTime<Utc>>,
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentReference {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Labels {
    #[serde(default)]
    pub trashed: bool,
}

/// One page of `GET /files`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub items: Vec<DriveFile>,
}

/// One page of `GET /changes`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeList {
    #[serde(default, deserialize_with = "opt_int64")]
    pub largest_change_id: Option<i64>,
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub items: Vec<Change>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub file_id: String,
    #[serde(default)]
    pub deleted: bool,
    pub file: Option<DriveFile>,
}

/// Error envelope of a failed request
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

/// int64 values are sent as JSON strings
fn int64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(i64),
        Text(String),
    }
    match Repr::deserialize(d)? {
        Repr::Num(n) => Ok(n),
        Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn opt_int64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    int64(d).map(Some)
}

// ============================================================================
// Conversions
// ============================================================================

fn remote_id(raw: &str) -> Result<RemoteId, DriveError> {
    RemoteId::new(raw).map_err(|e| DriveError::InvalidResponse(e.to_string()))
}

impl TryFrom<DriveFile> for RemoteObject {
    type Error = DriveError;

    fn try_from(file: DriveFile) -> Result<Self, Self::Error> {
        let parent_id = match file.parents.first() {
            Some(parent) => remote_id(&parent.id)?,
            None => RemoteId::root_alias(),
        };
        let content_hash = file
            .md5_checksum
            .as_deref()
            .map(ContentHash::new)
            .transpose()
            .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;

        Ok(RemoteObject {
            id: remote_id(&file.id)?,
            title: file.title,
            parent_id,
            is_directory: file.mime_type.as_deref() == Some(FOLDER_MIME_TYPE),
            mime_type: file.mime_type,
            content_hash,
            // undated objects count as just modified so the echo filter keeps them
            modified_time: file.modified_date.unwrap_or_else(Utc::now),
            is_trashed: file.labels.trashed,
        })
    }
}

impl TryFrom<Change> for ChangeEvent {
    type Error = DriveError;

    fn try_from(change: Change) -> Result<Self, Self::Error> {
        Ok(ChangeEvent {
            file_id: remote_id(&change.file_id)?,
            deleted: change.deleted,
            file: change.file.map(RemoteObject::try_from).transpose()?,
        })
    }
}

// ============================================================================
// Request bodies
// ============================================================================

/// Metadata sent on insert and patch; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<ParentReference>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<DateTime<Utc>>,
}

fn parents(id: &RemoteId) -> Option<Vec<ParentReference>> {
    Some(vec![ParentReference {
        id: id.as_str().to_string(),
    }])
}

impl From<&NewObject> for FileMetadata {
    fn from(object: &NewObject) -> Self {
        Self {
            title: Some(object.title.clone()),
            parents: parents(&object.parent_id),
            mime_type: None,
            modified_date: object.modified_time,
        }
    }
}

impl From<&MetadataPatch> for FileMetadata {
    fn from(patch: &MetadataPatch) -> Self {
        Self {
            title: patch.title.clone(),
            parents: patch.parent_id.as_ref().and_then(parents),
            ..Self::default()
        }
    }
}

impl FileMetadata {
    pub fn folder(object: &NewObject) -> Self {
        Self {
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            ..Self::from(object)
        }
    }
}
