//! Domain entities
//!
//! This module contains the core domain types for drivesync:
//! - Newtypes for remote identifiers and content hashes
//! - Remote object metadata and change feed types
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;
pub mod remote_object;

// Re-export commonly used types
pub use errors::DomainError;
pub use newtypes::{ContentHash, RemoteId};
pub use remote_object::{ChangeEvent, RemoteChangeSet, RemoteObject, FOLDER_MIME_TYPE};
