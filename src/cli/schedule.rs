//! Schedule CLI commands

use clap::{Args, Subcommand};

use crate::display::{
    format_schedule_details, format_schedule_list, format_schedule_logs, format_stats,
};
use crate::error::{VaultError, VaultResult};
use crate::models::schedule::{parse_time_of_day, parse_weekday};
use crate::models::{
    BackupKind, CompressionLevel, Frequency, Recurrence, ScheduleConfig, StorageLocation,
};
use crate::vault::Vault;

use super::print_json;

/// Recurrence and backup options shared by create and update
#[derive(Args)]
pub struct ScheduleSpec {
    /// daily, weekly, monthly or custom
    #[arg(long, default_value = "daily")]
    frequency: String,

    /// Every N days / weeks / months / custom units
    #[arg(long, default_value_t = 1)]
    every: u32,

    /// Time of day in UTC (HH:MM)
    #[arg(long, default_value = "02:00")]
    at: String,

    /// Weekdays for weekly schedules, e.g. mon,thu
    #[arg(long, value_delimiter = ',')]
    days: Vec<String>,

    /// Day of month for monthly schedules (clamped to the month's length)
    #[arg(long)]
    day_of_month: Option<u32>,

    /// Take full backups instead of incrementals
    #[arg(long)]
    full: bool,

    #[arg(long)]
    encrypt: bool,

    /// none, low, medium or high
    #[arg(long, default_value = "low")]
    compression: String,

    #[arg(long, default_value_t = 30)]
    retention_days: u32,

    /// local, cloud or hybrid
    #[arg(long, default_value = "local")]
    location: String,
}

impl ScheduleSpec {
    fn into_config(self, name: String) -> VaultResult<ScheduleConfig> {
        let frequency = Frequency::parse(&self.frequency).ok_or_else(|| {
            VaultError::Validation(format!("Unknown frequency: {}", self.frequency))
        })?;
        let time_of_day = parse_time_of_day(&self.at).ok_or_else(|| {
            VaultError::Validation(format!("Invalid time (expected HH:MM): {}", self.at))
        })?;
        let days_of_week = self
            .days
            .iter()
            .map(|d| {
                parse_weekday(d)
                    .ok_or_else(|| VaultError::Validation(format!("Unknown weekday: {}", d)))
            })
            .collect::<VaultResult<Vec<_>>>()?;

        let recurrence = Recurrence {
            frequency,
            interval: self.every,
            time_of_day,
            days_of_week,
            day_of_month: self.day_of_month,
        };
        Ok(ScheduleConfig {
            name,
            recurrence,
            backup_kind: if self.full {
                BackupKind::Full
            } else {
                BackupKind::Incremental
            },
            location: StorageLocation::parse(&self.location).ok_or_else(|| {
                VaultError::Validation(format!("Unknown storage location: {}", self.location))
            })?,
            is_encrypted: self.encrypt,
            compression: CompressionLevel::parse(&self.compression).ok_or_else(|| {
                VaultError::Validation(format!("Unknown compression level: {}", self.compression))
            })?,
            retention_days: self.retention_days,
        })
    }
}

/// Schedule subcommands
#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Create a recurring backup schedule
    Create {
        name: String,

        #[command(flatten)]
        spec: ScheduleSpec,
    },

    /// Replace a schedule's recurrence and backup options
    Update {
        /// Schedule name or ID prefix
        schedule: String,

        #[arg(long)]
        rename: Option<String>,

        #[command(flatten)]
        spec: ScheduleSpec,
    },

    /// List schedules
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show one schedule
    Show { schedule: String },

    /// Activate or deactivate a schedule
    Toggle { schedule: String },

    /// Run a schedule now and wait for its backup
    Run { schedule: String },

    /// Delete a schedule (its run history is kept)
    Delete {
        schedule: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show counters across all schedules
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Show the run history of a schedule
    Logs {
        schedule: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Handle a schedule command
pub async fn handle_schedule_command(
    vault: &Vault,
    actor: &str,
    cmd: ScheduleCommands,
) -> VaultResult<()> {
    let engine = vault.schedules();
    match cmd {
        ScheduleCommands::Create { name, spec } => {
            let schedule = engine.create_schedule(spec.into_config(name)?, actor)?;
            println!("Created schedule '{}' ({})", schedule.name, schedule.id);
            print!("{}", format_schedule_details(&schedule));
        }

        ScheduleCommands::Update {
            schedule,
            rename,
            spec,
        } => {
            let existing = engine.find_schedule(&schedule)?;
            let name = rename.unwrap_or(existing.name);
            let updated = engine.update_schedule(existing.id, spec.into_config(name)?, actor)?;
            println!("Updated schedule '{}'", updated.name);
            print!("{}", format_schedule_details(&updated));
        }

        ScheduleCommands::List { json } => {
            let schedules = engine.list_schedules()?;
            if json {
                print_json(&schedules)?;
            } else {
                println!("{}", format_schedule_list(&schedules));
            }
        }

        ScheduleCommands::Show { schedule } => {
            let schedule = engine.find_schedule(&schedule)?;
            print!("{}", format_schedule_details(&schedule));
        }

        ScheduleCommands::Toggle { schedule } => {
            let schedule = engine.find_schedule(&schedule)?;
            let toggled = engine.toggle_status(schedule.id, actor)?;
            if toggled.is_active {
                println!("Schedule '{}' activated", toggled.name);
            } else {
                println!("Schedule '{}' deactivated", toggled.name);
            }
        }

        ScheduleCommands::Run { schedule } => {
            let schedule = engine.find_schedule(&schedule)?;
            let run = engine.execute_schedule(schedule.id, actor).await?;
            match run.artifact_id {
                Some(artifact_id) => {
                    println!("Running '{}' as backup {}...", schedule.name, artifact_id);
                    vault.backups().wait_for(artifact_id).await?;
                    engine.reconcile()?;
                }
                None => println!(
                    "Run failed: {}",
                    run.error_message.as_deref().unwrap_or("unknown error")
                ),
            }
            let runs = engine.logs_for(schedule.id)?;
            println!("{}", format_schedule_logs(&runs[..runs.len().min(1)]));
        }

        ScheduleCommands::Delete { schedule, force } => {
            let schedule = engine.find_schedule(&schedule)?;
            if !force {
                println!("This will delete schedule '{}'.", schedule.name);
                println!("To proceed, run again with --force flag:");
                println!("  rollcall schedule delete {} --force", schedule.name);
                return Ok(());
            }
            engine.delete_schedule(schedule.id, actor)?;
            println!("Deleted schedule '{}'", schedule.name);
        }

        ScheduleCommands::Stats { json } => {
            let stats = engine.stats()?;
            if json {
                print_json(&stats)?;
            } else {
                print!("{}", format_stats(&stats));
            }
        }

        ScheduleCommands::Logs { schedule, limit } => {
            let schedule = engine.find_schedule(&schedule)?;
            let mut runs = engine.logs_for(schedule.id)?;
            runs.truncate(limit);
            println!("{}", format_schedule_logs(&runs));
        }
    }
    Ok(())
}
