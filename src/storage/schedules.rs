//! Schedule repository for JSON storage

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{VaultError, VaultResult};
use crate::models::{Schedule, ScheduleId};

use super::file_io::{read_json, write_json_atomic};
use super::{read_lock, resolve_prefix, write_lock};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct ScheduleData {
    schedules: Vec<Schedule>,
}

/// Repository for schedule persistence
pub struct ScheduleRepository {
    path: PathBuf,
    data: RwLock<HashMap<ScheduleId, Schedule>>,
}

impl ScheduleRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self) -> VaultResult<()> {
        let file_data: ScheduleData = read_json(&self.path)?;

        let mut data = write_lock(&self.data)?;
        data.clear();
        for schedule in file_data.schedules {
            data.insert(schedule.id, schedule);
        }

        Ok(())
    }

    fn persist(&self, data: &HashMap<ScheduleId, Schedule>) -> VaultResult<()> {
        let mut schedules: Vec<_> = data.values().cloned().collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        write_json_atomic(&self.path, &ScheduleData { schedules })
    }

    pub fn get(&self, id: ScheduleId) -> VaultResult<Option<Schedule>> {
        let data = read_lock(&self.data)?;
        Ok(data.get(&id).cloned())
    }

    pub fn require(&self, id: ScheduleId) -> VaultResult<Schedule> {
        self.get(id)?
            .ok_or_else(|| VaultError::schedule_not_found(id.to_string()))
    }

    /// Resolve an ID, an abbreviated ID or an exact (case-insensitive) name
    pub fn find(&self, query: &str) -> VaultResult<Schedule> {
        let data = read_lock(&self.data)?;
        let lower = query.to_lowercase();
        if let Some(schedule) = data.values().find(|s| s.name.to_lowercase() == lower) {
            return Ok(schedule.clone());
        }
        let id = resolve_prefix(query, data.keys().copied(), |id, q| id.matches_prefix(q))?
            .ok_or_else(|| VaultError::schedule_not_found(query))?;
        data.get(&id)
            .cloned()
            .ok_or_else(|| VaultError::schedule_not_found(query))
    }

    /// All schedules sorted by name
    pub fn get_all(&self) -> VaultResult<Vec<Schedule>> {
        let data = read_lock(&self.data)?;
        let mut schedules: Vec<_> = data.values().cloned().collect();
        schedules.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
        Ok(schedules)
    }

    /// Check if a schedule name is already taken
    pub fn name_exists(&self, name: &str, exclude_id: Option<ScheduleId>) -> VaultResult<bool> {
        let data = read_lock(&self.data)?;
        let lower = name.to_lowercase();
        Ok(data
            .values()
            .any(|s| s.name.to_lowercase() == lower && Some(s.id) != exclude_id))
    }

    /// Insert or replace a schedule
    pub fn upsert(&self, schedule: Schedule) -> VaultResult<()> {
        let mut data = write_lock(&self.data)?;
        data.insert(schedule.id, schedule);
        self.persist(&data)
    }

    /// Apply `f` to a copy of the schedule and store the result
    pub fn update<F>(&self, id: ScheduleId, f: F) -> VaultResult<Schedule>
    where
        F: FnOnce(&mut Schedule) -> VaultResult<()>,
    {
        let mut data = write_lock(&self.data)?;
        let mut next = data
            .get(&id)
            .cloned()
            .ok_or_else(|| VaultError::schedule_not_found(id.to_string()))?;
        f(&mut next)?;
        let previous = data.insert(id, next.clone());
        if let Err(e) = self.persist(&data) {
            if let Some(previous) = previous {
                data.insert(id, previous);
            }
            return Err(e);
        }
        Ok(next)
    }

    pub fn delete(&self, id: ScheduleId) -> VaultResult<bool> {
        let mut data = write_lock(&self.data)?;
        let removed = data.remove(&id).is_some();
        if removed {
            self.persist(&data)?;
        }
        Ok(removed)
    }
}
