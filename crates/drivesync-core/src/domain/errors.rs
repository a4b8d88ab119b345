//! Validation errors raised when constructing domain values

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Not an MD5 checksum in hex form
    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    /// Empty or otherwise unusable remote object id
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),
}
