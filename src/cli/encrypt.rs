//! Encryption CLI commands
//!
//! Provides commands for enabling encryption and inspecting its status.
//! Encryption only governs new backups; artifacts already written keep the
//! form they were written in.

use clap::Subcommand;

use crate::audit::{AuditAction, AuditEntry, AuditLogger, SubjectType};
use crate::config::{Settings, VaultPaths};
use crate::crypto::{derive_key, KeyDerivationParams, SecureString};
use crate::error::{VaultError, VaultResult};

/// Environment variable consulted before prompting for the passphrase
pub const PASSPHRASE_ENV: &str = "ROLLCALL_PASSPHRASE";

const MIN_PASSPHRASE_LEN: usize = 8;

/// Encryption management commands
#[derive(Subcommand)]
pub enum EncryptCommands {
    /// Enable encrypted backups
    Enable,

    /// Show encryption status
    Status,
}

/// Handle encryption commands
pub fn handle_encrypt_command(
    paths: &VaultPaths,
    settings: &mut Settings,
    actor: &str,
    cmd: EncryptCommands,
) -> VaultResult<()> {
    match cmd {
        EncryptCommands::Enable => enable_encryption(paths, settings, actor),
        EncryptCommands::Status => show_status(settings),
    }
}

fn enable_encryption(paths: &VaultPaths, settings: &mut Settings, actor: &str) -> VaultResult<()> {
    if settings.encryption.enabled {
        println!("Encryption is already enabled.");
        return Ok(());
    }

    println!("Enable Encryption");
    println!("=================");
    println!();
    println!("Encrypted backups are sealed with AES-256-GCM under a key derived");
    println!("from your passphrase with Argon2id.");
    println!();
    println!("IMPORTANT: If you forget your passphrase, encrypted backups cannot be restored!");
    println!();

    let passphrase = new_passphrase()?;
    let key_params = KeyDerivationParams::new();

    println!("Deriving encryption key...");
    let key = derive_key(passphrase.as_str(), &key_params)?;

    settings.encryption.enabled = true;
    settings.encryption.key_params = Some(key_params);
    settings.encryption.key_fingerprint = Some(key.fingerprint());
    settings.save(paths)?;

    AuditLogger::new(paths.audit_log()).record(AuditEntry::success(
        SubjectType::System,
        "encryption",
        AuditAction::EncryptionEnabled,
        format!("Encryption enabled (key {})", key.fingerprint()),
        actor,
    ));

    println!();
    println!("Encryption enabled successfully!");
    println!("Use --encrypt on 'backup create' or 'schedule create' to seal backups.");
    Ok(())
}

fn show_status(settings: &Settings) -> VaultResult<()> {
    println!("Encryption Status");
    println!("=================");
    println!();

    if settings.encryption.enabled {
        println!("Status: ENABLED");
        if let Some(ref fingerprint) = settings.encryption.key_fingerprint {
            println!("Key fingerprint: {}", fingerprint);
        }
        println!();
        if let Some(ref params) = settings.encryption.key_params {
            println!("Key Derivation Parameters:");
            println!("  Algorithm: Argon2id");
            println!("  Memory Cost: {} KiB", params.memory_cost);
            println!("  Time Cost: {} iterations", params.time_cost);
            println!("  Parallelism: {} threads", params.parallelism);
        }
    } else {
        println!("Status: DISABLED");
        println!();
        println!("Run 'rollcall encrypt enable' to enable encrypted backups.");
    }

    Ok(())
}

/// The passphrase from the environment, or from a hidden prompt
pub fn read_passphrase(prompt: &str) -> VaultResult<SecureString> {
    if let Ok(value) = std::env::var(PASSPHRASE_ENV) {
        return Ok(SecureString::new(value));
    }
    rpassword::prompt_password(prompt)
        .map(SecureString::new)
        .map_err(|e| VaultError::Encryption(format!("Failed to read passphrase: {}", e)))
}

/// Prompt for a new passphrase with confirmation
fn new_passphrase() -> VaultResult<SecureString> {
    if let Ok(value) = std::env::var(PASSPHRASE_ENV) {
        if value.len() < MIN_PASSPHRASE_LEN {
            return Err(VaultError::Validation(format!(
                "Passphrase must be at least {} characters",
                MIN_PASSPHRASE_LEN
            )));
        }
        return Ok(SecureString::new(value));
    }

    loop {
        let first = read_passphrase("Enter new passphrase: ")?;
        if first.as_str().len() < MIN_PASSPHRASE_LEN {
            println!(
                "Passphrase must be at least {} characters. Please try again.",
                MIN_PASSPHRASE_LEN
            );
            continue;
        }

        let second = read_passphrase("Confirm passphrase: ")?;
        if first.as_str() != second.as_str() {
            println!("Passphrases do not match. Please try again.");
            continue;
        }

        return Ok(first);
    }
}
