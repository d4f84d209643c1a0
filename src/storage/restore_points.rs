//! Restore point repository for JSON storage

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{VaultError, VaultResult};
use crate::models::{ArtifactId, RestorePoint, RestorePointId};

use super::file_io::{read_json, write_json_atomic};
use super::{read_lock, resolve_prefix, write_lock};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct RestorePointData {
    restore_points: Vec<RestorePoint>,
}

/// Repository for restore point persistence
pub struct RestorePointRepository {
    path: PathBuf,
    data: RwLock<HashMap<RestorePointId, RestorePoint>>,
}

impl RestorePointRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self) -> VaultResult<()> {
        let file_data: RestorePointData = read_json(&self.path)?;

        let mut data = write_lock(&self.data)?;
        data.clear();
        for point in file_data.restore_points {
            data.insert(point.id, point);
        }

        Ok(())
    }

    fn persist(&self, data: &HashMap<RestorePointId, RestorePoint>) -> VaultResult<()> {
        let mut restore_points: Vec<_> = data.values().cloned().collect();
        restore_points.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        write_json_atomic(&self.path, &RestorePointData { restore_points })
    }

    pub fn get(&self, id: RestorePointId) -> VaultResult<Option<RestorePoint>> {
        let data = read_lock(&self.data)?;
        Ok(data.get(&id).cloned())
    }

    /// Resolve an ID, an abbreviated ID or an exact name
    pub fn find(&self, query: &str) -> VaultResult<RestorePoint> {
        let data = read_lock(&self.data)?;
        if let Some(point) = data.values().find(|p| p.name == query) {
            return Ok(point.clone());
        }
        let id = resolve_prefix(query, data.keys().copied(), |id, q| id.matches_prefix(q))?
            .ok_or_else(|| VaultError::restore_point_not_found(query))?;
        data.get(&id)
            .cloned()
            .ok_or_else(|| VaultError::restore_point_not_found(query))
    }

    /// All restore points, newest first
    pub fn get_all(&self) -> VaultResult<Vec<RestorePoint>> {
        let data = read_lock(&self.data)?;
        let mut points: Vec<_> = data.values().cloned().collect();
        points.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(points)
    }

    /// Insert a restore point, rejecting a duplicate name with `Conflict`
    pub fn insert_unique(&self, point: RestorePoint) -> VaultResult<RestorePoint> {
        let mut data = write_lock(&self.data)?;
        if data.values().any(|p| p.name == point.name) {
            return Err(VaultError::Conflict(format!(
                "Restore point '{}' already exists",
                point.name
            )));
        }
        data.insert(point.id, point.clone());
        if let Err(e) = self.persist(&data) {
            data.remove(&point.id);
            return Err(e);
        }
        Ok(point)
    }

    /// Apply `f` to a copy of the point and store the result
    pub fn update<F>(&self, id: RestorePointId, f: F) -> VaultResult<RestorePoint>
    where
        F: FnOnce(&mut RestorePoint) -> VaultResult<()>,
    {
        let mut data = write_lock(&self.data)?;
        let mut next = data
            .get(&id)
            .cloned()
            .ok_or_else(|| VaultError::restore_point_not_found(id.to_string()))?;
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

    /// Expire every usable point of `artifact_id`, returning how many changed
    pub fn expire_for_artifact(&self, artifact_id: ArtifactId) -> VaultResult<usize> {
        let mut data = write_lock(&self.data)?;
        let previous = data.clone();
        let mut expired = 0;
        for point in data.values_mut() {
            if point.artifact_id == artifact_id && point.is_usable() {
                point.expire();
                expired += 1;
            }
        }
        if expired > 0 {
            if let Err(e) = self.persist(&data) {
                *data = previous;
                return Err(e);
            }
        }
        Ok(expired)
    }

    pub fn delete(&self, id: RestorePointId) -> VaultResult<bool> {
        let mut data = write_lock(&self.data)?;
        let removed = data.remove(&id).is_some();
        if removed {
            self.persist(&data)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RestorePointStatus;
    use tempfile::TempDir;

    fn create_test_repo() -> (TempDir, RestorePointRepository) {
        let temp_dir = TempDir::new().unwrap();
        let repo = RestorePointRepository::new(temp_dir.path().join("restore_points.json"));
        (temp_dir, repo)
    }

    #[test]
    fn test_duplicate_name_conflicts() {
        let (_temp_dir, repo) = create_test_repo();
        let artifact = ArtifactId::new();
        repo.insert_unique(RestorePoint::new(artifact, "before-term", "", "admin"))
            .unwrap();
        let err = repo
            .insert_unique(RestorePoint::new(artifact, "before-term", "", "admin"))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_find_by_name_and_update() {
        let (temp_dir, repo) = create_test_repo();
        let point = repo
            .insert_unique(RestorePoint::new(ArtifactId::new(), "pre-upgrade", "", "admin"))
            .unwrap();

        let found = repo.find("pre-upgrade").unwrap();
        assert_eq!(found.id, point.id);

        repo.update(point.id, |p| {
            p.expire();
            Ok(())
        })
        .unwrap();

        let reloaded = RestorePointRepository::new(temp_dir.path().join("restore_points.json"));
        reloaded.load().unwrap();
        assert_eq!(
            reloaded.get(point.id).unwrap().unwrap().status,
            RestorePointStatus::Expired
        );
    }
}
