//! drivesync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `RemoteObject`, `ChangeEvent`, `RemoteChangeSet`, `RemoteId`, `ContentHash`
//! - **Port definitions** - `IRemoteStore`, the interface every remote backend implements
//! - **Configuration** - `Config`, loaded from the YAML file in the metadata directory
//!
//! # Architecture
//!
//! The domain module is pure data with no I/O. Ports define the trait
//! interfaces that adapter crates (`drivesync-drive`) implement, and the
//! reconcilers in `drivesync-sync` drive those ports.

pub mod config;
pub mod domain;
pub mod ports;
