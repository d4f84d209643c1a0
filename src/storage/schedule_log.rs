//! Schedule execution log for JSON storage
//!
//! Entries are append-only; only their status fields move forward.

use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{VaultError, VaultResult};
use crate::models::{ArtifactId, ScheduleId, ScheduleLogEntry, ScheduleLogId, ScheduleRunStatus};

use super::file_io::{read_json, write_json_atomic};
use super::{read_lock, write_lock};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct ScheduleLogData {
    entries: Vec<ScheduleLogEntry>,
}

/// Repository for schedule log persistence
pub struct ScheduleLogRepository {
    path: PathBuf,
    data: RwLock<Vec<ScheduleLogEntry>>,
}

impl ScheduleLogRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(Vec::new()),
        }
    }

    pub fn load(&self) -> VaultResult<()> {
        let file_data: ScheduleLogData = read_json(&self.path)?;
        let mut data = write_lock(&self.data)?;
        *data = file_data.entries;
        Ok(())
    }

    fn persist(&self, entries: &[ScheduleLogEntry]) -> VaultResult<()> {
        write_json_atomic(
            &self.path,
            &ScheduleLogData {
                entries: entries.to_vec(),
            },
        )
    }

    pub fn append(&self, entry: ScheduleLogEntry) -> VaultResult<()> {
        let mut data = write_lock(&self.data)?;
        data.push(entry);
        if let Err(e) = self.persist(&data) {
            data.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Move an entry to `to`, applying `f`; illegal transitions are `State` errors
    pub fn transition<F>(
        &self,
        id: ScheduleLogId,
        to: ScheduleRunStatus,
        f: F,
    ) -> VaultResult<ScheduleLogEntry>
    where
        F: FnOnce(&mut ScheduleLogEntry),
    {
        let mut data = write_lock(&self.data)?;
        let index = data
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| VaultError::NotFound {
                entity_type: "Schedule run",
                identifier: id.to_string(),
            })?;

        let mut next = data[index].clone();
        if !next.status.can_transition_to(to) {
            return Err(VaultError::State(format!(
                "Schedule run {} is {}, cannot move to {}",
                id, next.status, to
            )));
        }
        next.status = to;
        f(&mut next);

        let previous = std::mem::replace(&mut data[index], next.clone());
        if let Err(e) = self.persist(&data) {
            data[index] = previous;
            return Err(e);
        }
        Ok(next)
    }

    /// Runs of one schedule, newest first
    pub fn for_schedule(&self, schedule_id: ScheduleId) -> VaultResult<Vec<ScheduleLogEntry>> {
        let data = read_lock(&self.data)?;
        let mut entries: Vec<_> = data
            .iter()
            .filter(|e| e.schedule_id == schedule_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        Ok(entries)
    }

    /// The Running entry of a schedule, if any
    pub fn running_for(&self, schedule_id: ScheduleId) -> VaultResult<Option<ScheduleLogEntry>> {
        let data = read_lock(&self.data)?;
        Ok(data
            .iter()
            .find(|e| e.schedule_id == schedule_id && e.status == ScheduleRunStatus::Running)
            .cloned())
    }

    /// Every Running entry
    pub fn running(&self) -> VaultResult<Vec<ScheduleLogEntry>> {
        let data = read_lock(&self.data)?;
        Ok(data
            .iter()
            .filter(|e| e.status == ScheduleRunStatus::Running)
            .cloned()
            .collect())
    }

    /// The Running entry that owns `artifact_id`
    pub fn running_for_artifact(
        &self,
        artifact_id: ArtifactId,
    ) -> VaultResult<Option<ScheduleLogEntry>> {
        let data = read_lock(&self.data)?;
        Ok(data
            .iter()
            .find(|e| e.artifact_id == Some(artifact_id) && e.status == ScheduleRunStatus::Running)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_transition() {
        let temp_dir = TempDir::new().unwrap();
        let repo = ScheduleLogRepository::new(temp_dir.path().join("schedule_log.json"));
        let schedule_id = ScheduleId::new();
        let artifact_id = ArtifactId::new();

        let entry = ScheduleLogEntry::scheduled(schedule_id, Utc::now(), false);
        repo.append(entry.clone()).unwrap();
        repo.transition(entry.id, ScheduleRunStatus::Running, |e| {
            e.artifact_id = Some(artifact_id);
            e.started_at = Some(Utc::now());
        })
        .unwrap();

        assert!(repo.running_for(schedule_id).unwrap().is_some());
        assert_eq!(
            repo.running_for_artifact(artifact_id).unwrap().unwrap().id,
            entry.id
        );

        repo.transition(entry.id, ScheduleRunStatus::Completed, |_| {})
            .unwrap();
        assert!(repo.running().unwrap().is_empty());

        let err = repo
            .transition(entry.id, ScheduleRunStatus::Running, |_| {})
            .unwrap_err();
        assert!(err.is_state());
    }

    #[test]
    fn test_for_schedule_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("schedule_log.json");
        let repo = ScheduleLogRepository::new(path.clone());
        let schedule_id = ScheduleId::new();
        let now = Utc::now();

        repo.append(ScheduleLogEntry::scheduled(schedule_id, now - chrono::Duration::days(1), false))
            .unwrap();
        repo.append(ScheduleLogEntry::scheduled(schedule_id, now, true))
            .unwrap();
        repo.append(ScheduleLogEntry::scheduled(ScheduleId::new(), now, false))
            .unwrap();

        let reloaded = ScheduleLogRepository::new(path);
        reloaded.load().unwrap();
        let entries = reloaded.for_schedule(schedule_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].manual);
    }
}
