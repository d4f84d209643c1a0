//! Rollcall - backup, restore and schedule orchestration
//!
//! This library snapshots the tracked file trees and dataset tables of an
//! attendance platform into self-describing artifacts, restores them, and
//! runs recurring backups on a schedule.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `models`: Artifacts, restore points, schedules and jobs
//! - `storage`: JSON file stores for every record type
//! - `detect`: Change detection against a base artifact
//! - `archive`: The artifact file format
//! - `backup`: Asynchronous backup orchestration
//! - `restore`: Preview, validation, restore and rollback
//! - `schedule`: Recurring backups and the ticker
//! - `audit`: Audit logging system
//! - `vault`: One handle wiring all of the above
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall::config::{Settings, VaultPaths};
//! use rollcall::vault::Vault;
//!
//! let paths = VaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let vault = Vault::open(paths, settings, None)?;
//! ```

pub mod archive;
pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod dataset;
pub mod detect;
pub mod display;
pub mod error;
pub mod models;
pub mod notify;
pub mod restore;
pub mod schedule;
pub mod storage;
pub mod vault;

pub use error::{VaultError, VaultResult};
