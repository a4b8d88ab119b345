//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces that the synchronization core depends on, but whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Remote object store operations (Google Drive)

pub mod remote_store;

pub use remote_store::{
    AboutInfo, Download, IRemoteStore, MetadataPatch, NewObject, ObjectKind, ObjectPages, Tokens,
};
