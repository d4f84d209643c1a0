//! Path management for Rollcall
//!
//! Provides platform-aware path resolution for configuration, stores,
//! artifacts and the audit log.
//!
//! ## Path Resolution Order
//!
//! 1. `ROLLCALL_DATA_DIR` environment variable (if set)
//! 2. The platform config directory from `directories` (e.g.
//!    `~/.config/rollcall` on Linux, `%APPDATA%\rollcall` on Windows)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::VaultError;

/// Manages all paths used by Rollcall
#[derive(Debug, Clone)]
pub struct VaultPaths {
    /// Base directory for all Rollcall data
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Create a new VaultPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no platform config directory can be determined.
    pub fn new() -> Result<Self, VaultError> {
        let base_dir = if let Ok(custom) = std::env::var("ROLLCALL_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create VaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory holding the metadata stores
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Default directory for the JSON dataset tables
    pub fn tables_dir(&self) -> PathBuf {
        self.base_dir.join("tables")
    }

    /// Directory holding completed artifact files
    pub fn artifacts_dir(&self) -> PathBuf {
        self.base_dir.join("artifacts")
    }

    /// Scratch directory for artifacts being written
    pub fn temp_dir(&self) -> PathBuf {
        self.artifacts_dir().join(".partial")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    pub fn artifacts_file(&self) -> PathBuf {
        self.data_dir().join("artifacts.json")
    }

    pub fn restore_points_file(&self) -> PathBuf {
        self.data_dir().join("restore_points.json")
    }

    pub fn schedules_file(&self) -> PathBuf {
        self.data_dir().join("schedules.json")
    }

    pub fn schedule_log_file(&self) -> PathBuf {
        self.data_dir().join("schedule_log.json")
    }

    /// Durable backup job queue
    pub fn jobs_file(&self) -> PathBuf {
        self.data_dir().join("jobs.json")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), VaultError> {
        for dir in [
            self.base_dir.clone(),
            self.data_dir(),
            self.artifacts_dir(),
            self.temp_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                VaultError::Io(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
        }

        Ok(())
    }

    /// Check if Rollcall has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

fn resolve_default_path() -> Result<PathBuf, VaultError> {
    ProjectDirs::from("", "", "rollcall")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| VaultError::Config("Could not determine a config directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.data_dir(), temp_dir.path().join("data"));
        assert_eq!(paths.artifacts_dir(), temp_dir.path().join("artifacts"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        paths.ensure_directories().unwrap();

        assert!(paths.data_dir().exists());
        assert!(paths.artifacts_dir().exists());
        assert!(paths.temp_dir().exists());
    }

    #[test]
    fn test_file_paths() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
        assert_eq!(
            paths.jobs_file(),
            temp_dir.path().join("data").join("jobs.json")
        );
    }
}
