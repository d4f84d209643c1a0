//! Configuration module for Rollcall
//!
//! This module provides configuration management including:
//! - Platform-aware path resolution
//! - Settings persistence (tracked roots, tables, pool sizes, timeouts)

pub mod paths;
pub mod settings;

pub use paths::VaultPaths;
pub use settings::{Settings, TrackedRoot};
