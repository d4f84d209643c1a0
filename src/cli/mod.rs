//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the engines behind `Vault`.

pub mod audit;
pub mod backup;
pub mod daemon;
pub mod encrypt;
pub mod restore;
pub mod schedule;

use serde::Serialize;

use crate::error::{VaultError, VaultResult};

pub use audit::{handle_audit_command, AuditCommands};
pub use backup::{handle_backup_command, BackupCommands};
pub use daemon::run_daemon;
pub use encrypt::{handle_encrypt_command, read_passphrase, EncryptCommands, PASSPHRASE_ENV};
pub use restore::{handle_point_command, handle_restore_command, PointCommands, RestoreCommands};
pub use schedule::{handle_schedule_command, ScheduleCommands};

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> VaultResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| VaultError::Json(format!("Failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}
