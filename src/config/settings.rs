//! User settings for Rollcall
//!
//! Manages the tracked file roots and tables, worker pool sizing, timeouts,
//! scheduler cadence, retention and encryption settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::crypto::key_derivation::KeyDerivationParams;
use crate::error::VaultError;
use crate::models::CompressionLevel;

/// A file-system root included in backups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRoot {
    /// Stable name used as the first path segment inside artifacts
    pub name: String,
    /// Directory on disk
    pub path: PathBuf,
}

impl TrackedRoot {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Dataset (relational export) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSettings {
    /// Directory of JSON table files; defaults to `<base>/tables`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables_dir: Option<PathBuf>,
    /// Tables to include (empty = every table found)
    #[serde(default)]
    pub tables: Vec<String>,
    /// Row field holding the last-modified timestamp
    #[serde(default = "default_watermark_column")]
    pub watermark_column: String,
}

fn default_watermark_column() -> String {
    "updated_at".to_string()
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            tables_dir: None,
            tables: Vec::new(),
            watermark_column: default_watermark_column(),
        }
    }
}

/// Backup execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Maximum number of artifacts executing at once
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Maximum duration of one backup execution
    #[serde(default = "default_backup_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub default_compression: CompressionLevel,
    #[serde(default = "default_retention_days")]
    pub default_retention_days: u32,
}

fn default_worker_pool_size() -> usize {
    2
}

fn default_backup_timeout_secs() -> u64 {
    3600
}

fn default_retention_days() -> u32 {
    30
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            timeout_secs: default_backup_timeout_secs(),
            default_compression: CompressionLevel::default(),
            default_retention_days: default_retention_days(),
        }
    }
}

impl BackupSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Restore settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSettings {
    /// Maximum duration of one restore
    #[serde(default = "default_restore_timeout_secs")]
    pub timeout_secs: u64,
    /// Take a full backup before rolling back to a restore point
    #[serde(default = "default_true")]
    pub safety_snapshot: bool,
}

fn default_restore_timeout_secs() -> u64 {
    1800
}

fn default_true() -> bool {
    true
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_restore_timeout_secs(),
            safety_snapshot: true,
        }
    }
}

impl RestoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds between ticker scans
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Length of one CUSTOM interval unit in seconds
    #[serde(default = "default_custom_unit_secs")]
    pub custom_unit_secs: u64,
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_custom_unit_secs() -> u64 {
    3600
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            custom_unit_secs: default_custom_unit_secs(),
        }
    }
}

impl SchedulerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn custom_unit(&self) -> chrono::Duration {
        // capped at ten years so the span stays representable
        let secs = self.custom_unit_secs.clamp(1, 10 * 365 * 24 * 3600);
        chrono::Duration::seconds(secs as i64)
    }
}

/// Encryption settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EncryptionSettings {
    /// Whether encrypted artifacts can be produced
    #[serde(default)]
    pub enabled: bool,

    /// Key derivation parameters (salt, memory cost, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_params: Option<KeyDerivationParams>,

    /// Fingerprint of the derived key, used to reject a wrong passphrase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_fingerprint: Option<String>,
}

/// User settings for Rollcall
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// File-system roots to back up
    #[serde(default)]
    pub tracked_roots: Vec<TrackedRoot>,

    #[serde(default)]
    pub dataset: DatasetSettings,

    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub restore: RestoreSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Days to keep audit entries before the global sweep removes them
    #[serde(default = "default_audit_retention_days")]
    pub audit_retention_days: u32,

    #[serde(default)]
    pub encryption: EncryptionSettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_audit_retention_days() -> u32 {
    365
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            tracked_roots: Vec::new(),
            dataset: DatasetSettings::default(),
            backup: BackupSettings::default(),
            restore: RestoreSettings::default(),
            scheduler: SchedulerSettings::default(),
            audit_retention_days: default_audit_retention_days(),
            encryption: EncryptionSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &VaultPaths) -> Result<Self, VaultError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| VaultError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents)
                .map_err(|e| VaultError::Config(format!("Failed to parse settings file: {}", e)))?;

            settings.validate()?;
            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> Result<(), VaultError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| VaultError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Reject settings that would make the engines misbehave
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.backup.worker_pool_size == 0 {
            return Err(VaultError::Config("worker_pool_size must be at least 1".into()));
        }
        if self.scheduler.tick_interval_secs == 0 || self.scheduler.custom_unit_secs == 0 {
            return Err(VaultError::Config(
                "scheduler intervals must be greater than zero".into(),
            ));
        }
        let mut names: Vec<&str> = self.tracked_roots.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(VaultError::Config("tracked root names must be unique".into()));
        }
        if names.iter().any(|n| n.is_empty() || n.contains('/') || n.contains('\\')) {
            return Err(VaultError::Config(
                "tracked root names must be non-empty and contain no path separators".into(),
            ));
        }
        Ok(())
    }

    /// Directory of JSON table files
    pub fn tables_dir(&self, paths: &VaultPaths) -> PathBuf {
        self.dataset
            .tables_dir
            .clone()
            .unwrap_or_else(|| paths.tables_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.backup.worker_pool_size, 2);
        assert_eq!(settings.scheduler.tick_interval_secs, 60);
        assert!(settings.restore.safety_snapshot);
        assert!(!settings.encryption.enabled);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.tracked_roots.push(TrackedRoot::new("uploads", "/srv/uploads"));
        settings.backup.worker_pool_size = 4;

        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.tracked_roots, settings.tracked_roots);
        assert_eq!(loaded.backup.worker_pool_size, 4);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"audit_retention_days": 30}"#).unwrap();
        assert_eq!(settings.audit_retention_days, 30);
        assert_eq!(settings.dataset.watermark_column, "updated_at");
    }

    #[test]
    fn test_duplicate_root_names_rejected() {
        let mut settings = Settings::default();
        settings.tracked_roots.push(TrackedRoot::new("files", "/a"));
        settings.tracked_roots.push(TrackedRoot::new("files", "/b"));
        assert!(settings.validate().is_err());
    }
}
