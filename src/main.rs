use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rollcall::cli::{
    handle_audit_command, handle_backup_command, handle_encrypt_command, handle_point_command,
    handle_restore_command, handle_schedule_command, read_passphrase, run_daemon, AuditCommands,
    BackupCommands, EncryptCommands, PointCommands, RestoreCommands, ScheduleCommands,
};
use rollcall::config::{Settings, TrackedRoot, VaultPaths};
use rollcall::crypto::DerivedKey;
use rollcall::vault::{unlock, Vault};

#[derive(Parser)]
#[command(
    name = "rollcall",
    version,
    about = "Backup, restore and schedule orchestration for Rollcall",
    long_about = "Rollcall snapshots the tracked record trees and dataset tables of an \
                  attendance platform into full or incremental backups, restores them, \
                  and runs recurring backups on a schedule."
)]
struct Cli {
    /// Name recorded as the actor in the audit log
    #[arg(long, global = true, env = "ROLLCALL_ACTOR", default_value = "operator")]
    actor: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vault and register tracked roots
    Init {
        /// Tracked file tree as NAME=PATH (repeatable)
        #[arg(long = "root", value_name = "NAME=PATH")]
        roots: Vec<String>,

        /// Dataset table to back up (repeatable; default: every table found)
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Directory holding the JSON dataset tables
        #[arg(long)]
        tables_dir: Option<std::path::PathBuf>,
    },

    /// Show current configuration and paths
    Config,

    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Restore commands
    #[command(subcommand)]
    Restore(RestoreCommands),

    /// Restore point commands
    #[command(subcommand)]
    Point(PointCommands),

    /// Schedule management commands
    #[command(subcommand)]
    Schedule(ScheduleCommands),

    /// Audit log commands
    #[command(subcommand)]
    Audit(AuditCommands),

    /// Encryption commands
    #[command(subcommand)]
    Encrypt(EncryptCommands),

    /// Run the scheduler until Ctrl-C
    Daemon,
}

impl Commands {
    /// Whether the command may write or read encrypted payloads
    fn needs_key(&self) -> bool {
        matches!(
            self,
            Commands::Backup(BackupCommands::Create { .. })
                | Commands::Restore(
                    RestoreCommands::Validate { .. }
                        | RestoreCommands::Apply { .. }
                        | RestoreCommands::Rollback { force: true, .. }
                )
                | Commands::Schedule(ScheduleCommands::Run { .. })
                | Commands::Daemon
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = VaultPaths::new()?;
    let mut settings = Settings::load_or_create(&paths)?;

    let command = match cli.command {
        Some(command) => command,
        None => {
            println!("Rollcall - backup, restore and schedule orchestration");
            println!();
            println!("Run 'rollcall --help' for usage information.");
            println!("Run 'rollcall init --root records=/path/to/records' to get started.");
            return Ok(());
        }
    };

    match command {
        Commands::Init {
            roots,
            tables,
            tables_dir,
        } => {
            for root in roots {
                let (name, path) = root
                    .split_once('=')
                    .with_context(|| format!("Expected NAME=PATH, got '{}'", root))?;
                let path = std::fs::canonicalize(path)
                    .with_context(|| format!("Tracked root does not exist: {}", path))?;
                settings.tracked_roots.retain(|r| r.name != name);
                settings.tracked_roots.push(TrackedRoot::new(name, path));
            }
            if !tables.is_empty() {
                settings.dataset.tables = tables;
            }
            if tables_dir.is_some() {
                settings.dataset.tables_dir = tables_dir;
            }
            settings.validate()?;

            println!("Initializing Rollcall at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            settings.save(&paths)?;
            println!("Initialization complete!");
            if settings.tracked_roots.is_empty() {
                println!();
                println!("No tracked roots yet. Add one with:");
                println!("  rollcall init --root records=/path/to/records");
            }
        }

        Commands::Config => {
            println!("Rollcall Configuration");
            println!("======================");
            println!("Base directory:     {}", paths.base_dir().display());
            println!("Artifact directory: {}", paths.artifacts_dir().display());
            println!("Tables directory:   {}", settings.tables_dir(&paths).display());
            println!("Audit log:          {}", paths.audit_log().display());
            println!();
            println!("Tracked roots:");
            if settings.tracked_roots.is_empty() {
                println!("  (none)");
            }
            for root in &settings.tracked_roots {
                println!("  {} = {}", root.name, root.path.display());
            }
            println!();
            println!("Settings:");
            println!("  Worker pool size:   {}", settings.backup.worker_pool_size);
            println!("  Backup timeout:     {}s", settings.backup.timeout_secs);
            println!("  Restore timeout:    {}s", settings.restore.timeout_secs);
            println!("  Default retention:  {} day(s)", settings.backup.default_retention_days);
            println!("  Safety snapshot:    {}", settings.restore.safety_snapshot);
            println!("  Tick interval:      {}s", settings.scheduler.tick_interval_secs);
            println!("  Encryption enabled: {}", settings.encryption.enabled);
        }

        Commands::Encrypt(cmd) => {
            handle_encrypt_command(&paths, &mut settings, &cli.actor, cmd)?;
        }

        command => {
            if !paths.is_initialized() {
                bail!("Rollcall is not initialized. Run 'rollcall init' first.");
            }
            let key = if command.needs_key() {
                load_key(&settings)?
            } else {
                None
            };
            let vault = Vault::open(paths, settings, key)?;
            let actor = cli.actor.as_str();

            match command {
                Commands::Backup(cmd) => handle_backup_command(&vault, actor, cmd).await?,
                Commands::Restore(cmd) => handle_restore_command(&vault, actor, cmd).await?,
                Commands::Point(cmd) => handle_point_command(&vault, actor, cmd)?,
                Commands::Schedule(cmd) => handle_schedule_command(&vault, actor, cmd).await?,
                Commands::Audit(cmd) => handle_audit_command(&vault, actor, cmd)?,
                Commands::Daemon => run_daemon(&vault).await?,
                Commands::Init { .. } | Commands::Config | Commands::Encrypt(_) => {}
            }
        }
    }

    Ok(())
}

fn load_key(settings: &Settings) -> Result<Option<DerivedKey>> {
    if !settings.encryption.enabled {
        return Ok(None);
    }
    let passphrase = read_passphrase("Enter passphrase: ")?;
    let key = unlock(settings, &passphrase)?;
    Ok(Some(key))
}
