//! Audit log CLI commands

use chrono::Utc;
use clap::Subcommand;

use crate::error::VaultResult;
use crate::vault::Vault;

use super::print_json;

/// Audit subcommands
#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show recent audit entries, oldest first
    List {
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only entries whose subject ID starts with this prefix
        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Remove entries older than the configured audit retention
    Sweep,
}

/// Handle an audit command
pub fn handle_audit_command(vault: &Vault, actor: &str, cmd: AuditCommands) -> VaultResult<()> {
    match cmd {
        AuditCommands::List {
            limit,
            subject,
            json,
        } => {
            let mut entries = vault.audit().read_all()?;
            if let Some(prefix) = subject {
                entries.retain(|e| e.subject_id.starts_with(&prefix));
            }
            let start = entries.len().saturating_sub(limit);
            let entries = &entries[start..];

            if json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("No audit entries found.");
            } else {
                for entry in entries {
                    println!("{}", entry.format_human_readable());
                }
            }
        }
        AuditCommands::Sweep => {
            let removed = vault.sweep_audit(Utc::now(), actor)?;
            println!("Removed {} audit entries.", removed);
        }
    }
    Ok(())
}
