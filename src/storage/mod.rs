//! Storage layer for Rollcall
//!
//! Provides JSON file storage with atomic writes for the metadata stores:
//! artifacts, restore points, schedules, the schedule run log and the
//! durable job queue.

pub mod artifacts;
pub mod file_io;
pub mod jobs;
pub mod restore_points;
pub mod schedule_log;
pub mod schedules;

pub use artifacts::{ArtifactFilter, ArtifactRepository, Inserted};
pub use file_io::{read_json, write_bytes_atomic, write_json_atomic};
pub use jobs::JobRepository;
pub use restore_points::RestorePointRepository;
pub use schedule_log::ScheduleLogRepository;
pub use schedules::ScheduleRepository;

use std::fmt::Display;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::paths::VaultPaths;
use crate::error::{VaultError, VaultResult};

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> VaultResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| VaultError::Storage(format!("Failed to acquire read lock: {}", e)))
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> VaultResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| VaultError::Storage(format!("Failed to acquire write lock: {}", e)))
}

/// Find the single ID matching an operator-typed (possibly abbreviated) ID
///
/// Returns `Ok(None)` when nothing matches and a validation error when the
/// abbreviation is ambiguous.
pub(crate) fn resolve_prefix<I, F>(
    query: &str,
    ids: impl Iterator<Item = I>,
    matches: F,
) -> VaultResult<Option<I>>
where
    I: Copy + Display,
    F: Fn(&I, &str) -> bool,
{
    let query = query.trim();
    let mut found: Option<I> = None;
    for id in ids.filter(|id| matches(id, query)) {
        if let Some(first) = found {
            return Err(VaultError::Validation(format!(
                "'{}' is ambiguous: matches {} and {}",
                query, first, id
            )));
        }
        found = Some(id);
    }
    Ok(found)
}

/// Main storage coordinator that provides access to all repositories
pub struct Storage {
    paths: VaultPaths,
    pub artifacts: Arc<ArtifactRepository>,
    pub restore_points: RestorePointRepository,
    pub schedules: ScheduleRepository,
    pub schedule_log: ScheduleLogRepository,
    pub jobs: JobRepository,
}

impl Storage {
    /// Create a Storage instance and load every store from disk
    pub fn open(paths: VaultPaths) -> VaultResult<Self> {
        paths.ensure_directories()?;

        let storage = Self {
            artifacts: Arc::new(ArtifactRepository::new(paths.artifacts_file())),
            restore_points: RestorePointRepository::new(paths.restore_points_file()),
            schedules: ScheduleRepository::new(paths.schedules_file()),
            schedule_log: ScheduleLogRepository::new(paths.schedule_log_file()),
            jobs: JobRepository::new(paths.jobs_file()),
            paths,
        };
        storage.load_all()?;
        Ok(storage)
    }

    /// Get the paths configuration
    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    /// Reload all data from disk
    pub fn load_all(&self) -> VaultResult<()> {
        self.artifacts.load()?;
        self.restore_points.load()?;
        self.schedules.load()?;
        self.schedule_log.load()?;
        self.jobs.load()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_creation() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());
        let storage = Storage::open(paths).unwrap();

        assert!(temp_dir.path().join("data").exists());
        assert!(temp_dir.path().join("artifacts").join(".partial").exists());
        assert_eq!(storage.artifacts.count().unwrap(), 0);
    }

    #[test]
    fn test_resolve_prefix_ambiguity() {
        let ids = [11u32, 12, 21];
        let starts = |id: &u32, q: &str| id.to_string().starts_with(q);
        assert_eq!(resolve_prefix("2", ids.iter().copied(), starts).unwrap(), Some(21));
        assert_eq!(resolve_prefix("3", ids.iter().copied(), starts).unwrap(), None);
        assert!(resolve_prefix("1", ids.iter().copied(), starts)
            .unwrap_err()
            .is_validation());
    }
}
