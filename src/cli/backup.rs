//! Backup CLI commands
//!
//! Implements CLI commands for creating, inspecting and pruning backups.

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use tracing::info;

use crate::backup::CreateBackupRequest;
use crate::display::{format_artifact_details, format_artifact_list, format_change_set};
use crate::error::{VaultError, VaultResult};
use crate::models::{ArtifactStatus, BackupArtifact, BackupKind, CompressionLevel, StorageLocation};
use crate::storage::ArtifactFilter;
use crate::vault::Vault;

use super::print_json;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a backup and wait for it to finish (Ctrl-C cancels)
    Create {
        /// Take a full backup instead of an incremental one
        #[arg(long)]
        full: bool,

        /// Base artifact for an incremental (default: latest completed)
        #[arg(long)]
        base: Option<String>,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Encrypt the payload with the vault key
        #[arg(long)]
        encrypt: bool,

        /// none, low, medium or high
        #[arg(long)]
        compression: Option<String>,

        #[arg(long)]
        retention_days: Option<u32>,

        /// local, cloud or hybrid
        #[arg(long)]
        location: Option<String>,

        /// Repeating a key returns the earlier backup instead of a new one
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// List backups
    List {
        /// pending, in_progress, completed or failed
        #[arg(long)]
        status: Option<String>,

        /// full or incremental
        #[arg(long)]
        kind: Option<String>,

        /// Created on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Created before this date (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show one backup and its chain
    Show {
        /// Backup ID prefix or 'latest'
        backup: String,
    },

    /// Show what an incremental backup taken now would carry
    Changes {
        /// Compare against this backup instead of the latest completed
        #[arg(long)]
        base: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Delete backups past their retention
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a backup command
pub async fn handle_backup_command(
    vault: &Vault,
    actor: &str,
    cmd: BackupCommands,
) -> VaultResult<()> {
    match cmd {
        BackupCommands::Create {
            full,
            base,
            name,
            description,
            encrypt,
            compression,
            retention_days,
            location,
            idempotency_key,
        } => {
            let kind = if full {
                BackupKind::Full
            } else {
                BackupKind::Incremental
            };
            let mut request = CreateBackupRequest::new(kind, actor).encrypted(encrypt);
            if let Some(base) = base {
                request = request.with_base(resolve_artifact(vault, &base)?.id);
            }
            if let Some(name) = name {
                request = request.with_name(name);
            }
            if let Some(description) = description {
                request = request.with_description(description);
            }
            if let Some(key) = idempotency_key {
                request = request.with_idempotency_key(key);
            }
            if let Some(level) = compression {
                request.compression = Some(parse_compression(&level)?);
            }
            if let Some(location) = location {
                request.location = parse_location(&location)?;
            }
            request.retention_days = retention_days;

            let backups = vault.backups();
            let artifact = backups.create_backup(request).await?;
            println!("Backup {} accepted ({})", artifact.id, artifact.kind);

            let done = tokio::select! {
                done = backups.wait_for(artifact.id) => done?,
                _ = tokio::signal::ctrl_c() => {
                    backups.cancel_backup(artifact.id, actor)?;
                    println!("Cancelling...");
                    backups.wait_for(artifact.id).await?
                }
            };
            report_finished(&done);
        }

        BackupCommands::List {
            status,
            kind,
            since,
            until,
            json,
        } => {
            let filter = ArtifactFilter {
                status: status.map(|s| parse_status(&s)).transpose()?,
                kind: kind.map(|k| parse_kind(&k)).transpose()?,
                from: since.map(|d| parse_date(&d)).transpose()?,
                to: until.map(|d| parse_date(&d)).transpose()?,
            };
            let artifacts = vault.backups().list_artifacts(&filter)?;
            if json {
                print_json(&artifacts)?;
            } else {
                println!("{}", format_artifact_list(&artifacts));
            }
        }

        BackupCommands::Show { backup } => {
            let artifact = resolve_artifact(vault, &backup)?;
            let chain = vault.backups().resolve_chain(artifact.id).unwrap_or_default();
            print!("{}", format_artifact_details(&artifact, &chain));
        }

        BackupCommands::Changes { base, json } => {
            let base = base.map(|b| resolve_artifact(vault, &b)).transpose()?;
            let detector = std::sync::Arc::clone(vault.backups().detector());
            let changes = tokio::task::spawn_blocking(move || {
                detector.detect_changes(base.map(|b| b.id))
            })
            .await
            .map_err(|e| VaultError::Storage(format!("Change detection panicked: {}", e)))??;
            if json {
                print_json(&changes)?;
            } else {
                print!("{}", format_change_set(&changes));
            }
        }

        BackupCommands::Prune { force } => {
            if !force {
                let expired = vault
                    .backups()
                    .list_artifacts(&ArtifactFilter::default())?
                    .into_iter()
                    .filter(|a| a.is_expired(Utc::now()))
                    .count();
                println!("{} backup(s) are past their retention.", expired);
                println!("Backups that are still the base of a live backup are kept.");
                println!("To delete them, run again with --force flag:");
                println!("  rollcall backup prune --force");
                return Ok(());
            }

            let report = vault.backups().enforce_retention(Utc::now(), actor)?;
            let swept = vault.sweep_audit(Utc::now(), actor)?;
            println!("Deleted {} backup(s).", report.expired.len());
            if !report.kept_as_base.is_empty() {
                println!(
                    "Kept {} expired backup(s) still needed as a base.",
                    report.kept_as_base.len()
                );
            }
            if report.restore_points_expired > 0 {
                println!("Expired {} restore point(s).", report.restore_points_expired);
            }
            if swept > 0 {
                println!("Removed {} old audit entries.", swept);
            }
            info!(deleted = report.expired.len(), "prune finished");
        }
    }

    Ok(())
}

fn report_finished(artifact: &BackupArtifact) {
    match artifact.status {
        ArtifactStatus::Completed => {
            println!("Backup completed: {}", artifact.name);
            if let Some(ref path) = artifact.file_path {
                println!("Location: {}", path.display());
            }
        }
        _ => {
            println!(
                "Backup failed: {}",
                artifact.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

/// Resolve a backup identifier: an ID prefix or 'latest'
pub fn resolve_artifact(vault: &Vault, query: &str) -> VaultResult<BackupArtifact> {
    if query.eq_ignore_ascii_case("latest") {
        return vault
            .storage()
            .artifacts
            .latest_completed()?
            .ok_or_else(|| VaultError::artifact_not_found("latest"));
    }
    vault.backups().find_artifact(query)
}

fn parse_compression(s: &str) -> VaultResult<CompressionLevel> {
    CompressionLevel::parse(s)
        .ok_or_else(|| VaultError::Validation(format!("Unknown compression level: {}", s)))
}

fn parse_location(s: &str) -> VaultResult<StorageLocation> {
    StorageLocation::parse(s)
        .ok_or_else(|| VaultError::Validation(format!("Unknown storage location: {}", s)))
}

fn parse_status(s: &str) -> VaultResult<ArtifactStatus> {
    ArtifactStatus::parse(s)
        .ok_or_else(|| VaultError::Validation(format!("Unknown status: {}", s)))
}

fn parse_kind(s: &str) -> VaultResult<BackupKind> {
    BackupKind::parse(s).ok_or_else(|| VaultError::Validation(format!("Unknown kind: {}", s)))
}

fn parse_date(s: &str) -> VaultResult<chrono::DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| VaultError::Validation(format!("Invalid date (expected YYYY-MM-DD): {}", s)))
}
