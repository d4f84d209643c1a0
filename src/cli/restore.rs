//! Restore and restore point CLI commands

use clap::Subcommand;

use crate::display::{format_preview, format_restore_points, format_result, format_validation};
use crate::error::VaultResult;
use crate::restore::{RestoreOptions, RestoreOutcome};
use crate::vault::Vault;

use super::backup::resolve_artifact;
use super::print_json;

/// Restore subcommands
#[derive(Subcommand)]
pub enum RestoreCommands {
    /// Show what restoring a backup would write
    Preview {
        /// Backup ID prefix or 'latest'
        backup: String,

        #[arg(long)]
        json: bool,
    },

    /// Check that a backup and its chain can be restored
    Validate {
        backup: String,

        #[arg(long)]
        json: bool,
    },

    /// Restore a backup over the live files and tables
    Apply {
        backup: String,

        /// Overwrite live files that are newer than the backup
        #[arg(short, long)]
        force: bool,

        /// Restore tracked files only
        #[arg(long, conflicts_with = "tables_only")]
        files_only: bool,

        /// Restore dataset tables only
        #[arg(long)]
        tables_only: bool,

        /// Name a restore point for this backup once restored
        #[arg(long)]
        point: Option<String>,
    },

    /// Roll back to a named restore point
    Rollback {
        /// Restore point name or ID prefix
        point: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Restore point subcommands
#[derive(Subcommand)]
pub enum PointCommands {
    /// Name a completed backup as a rollback target
    Create {
        /// Backup ID prefix or 'latest'
        backup: String,

        name: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List restore points
    List {
        #[arg(long)]
        json: bool,
    },
}

/// Handle a restore command
pub async fn handle_restore_command(
    vault: &Vault,
    actor: &str,
    cmd: RestoreCommands,
) -> VaultResult<()> {
    let restores = vault.restores();
    match cmd {
        RestoreCommands::Preview { backup, json } => {
            let artifact = resolve_artifact(vault, &backup)?;
            let mut options = RestoreOptions::new(artifact.id);
            options.preview_only = true;
            if let RestoreOutcome::Preview(preview) =
                restores.perform_restore(options, actor).await?
            {
                if json {
                    print_json(&preview)?;
                } else {
                    print!("{}", format_preview(&preview));
                }
            }
        }

        RestoreCommands::Validate { backup, json } => {
            let artifact = resolve_artifact(vault, &backup)?;
            let mut options = RestoreOptions::new(artifact.id);
            options.validate_only = true;
            if let RestoreOutcome::Validation(validation) =
                restores.perform_restore(options, actor).await?
            {
                if json {
                    print_json(&validation)?;
                } else {
                    print!("{}", format_validation(&validation));
                }
            }
        }

        RestoreCommands::Apply {
            backup,
            force,
            files_only,
            tables_only,
            point,
        } => {
            let artifact = resolve_artifact(vault, &backup)?;
            let mut options = RestoreOptions::new(artifact.id);
            options.force = force;
            options.restore_files = !tables_only;
            options.restore_database = !files_only;
            options.restore_point_name = point;

            println!("Restoring from {}...", artifact);
            if let RestoreOutcome::Applied(result) =
                restores.perform_restore(options, actor).await?
            {
                print!("{}", format_result(&result));
            }
        }

        RestoreCommands::Rollback { point, force } => {
            let target = restores.get_restore_point(&point)?;
            if !force {
                println!("Restore point '{}' -> backup {}", target.name, target.artifact_id);
                println!();
                println!("WARNING: This will overwrite the tracked files and tables!");
                if vault.settings().restore.safety_snapshot {
                    println!("A full backup of the current state is taken first.");
                }
                println!("To proceed, run again with --force flag:");
                println!("  rollcall restore rollback {} --force", point);
                return Ok(());
            }

            let result = restores.rollback_to_restore_point(&point, actor).await?;
            print!("{}", format_result(&result));
        }
    }
    Ok(())
}

/// Handle a restore point command
pub fn handle_point_command(vault: &Vault, actor: &str, cmd: PointCommands) -> VaultResult<()> {
    let restores = vault.restores();
    match cmd {
        PointCommands::Create {
            backup,
            name,
            description,
        } => {
            let artifact = resolve_artifact(vault, &backup)?;
            let point = restores.create_restore_point(artifact.id, &name, &description, actor)?;
            println!("Created restore point '{}' ({}) for backup {}", point.name, point.id, artifact.id);
        }
        PointCommands::List { json } => {
            let points = restores.list_restore_points()?;
            if json {
                print_json(&points)?;
            } else {
                println!("{}", format_restore_points(&points));
            }
        }
    }
    Ok(())
}
