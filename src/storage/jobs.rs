//! Durable backup job queue
//!
//! `create_backup` enqueues a job before it returns; workers claim and
//! finish jobs. After a crash, Queued jobs are re-dispatched and Claimed jobs
//! identify artifacts that were interrupted mid-run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::{VaultError, VaultResult};
use crate::models::{ArtifactId, JobId, JobRecord, JobState};

use super::file_io::{read_json, write_json_atomic};
use super::{read_lock, write_lock};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct JobData {
    jobs: Vec<JobRecord>,
}

/// Repository for the job queue
pub struct JobRepository {
    path: PathBuf,
    data: RwLock<HashMap<JobId, JobRecord>>,
}

impl JobRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self) -> VaultResult<()> {
        let file_data: JobData = read_json(&self.path)?;
        let mut data = write_lock(&self.data)?;
        data.clear();
        for job in file_data.jobs {
            data.insert(job.id, job);
        }
        Ok(())
    }

    fn persist(&self, data: &HashMap<JobId, JobRecord>) -> VaultResult<()> {
        let mut jobs: Vec<_> = data.values().cloned().collect();
        jobs.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        write_json_atomic(&self.path, &JobData { jobs })
    }

    /// Record a new Queued job for `artifact_id`
    pub fn enqueue(&self, artifact_id: ArtifactId) -> VaultResult<JobRecord> {
        let job = JobRecord::queued(artifact_id);
        let mut data = write_lock(&self.data)?;
        data.insert(job.id, job.clone());
        if let Err(e) = self.persist(&data) {
            data.remove(&job.id);
            return Err(e);
        }
        Ok(job)
    }

    fn set_state(&self, id: JobId, from: JobState, to: JobState) -> VaultResult<JobRecord> {
        let mut data = write_lock(&self.data)?;
        let job = data.get_mut(&id).ok_or_else(|| VaultError::NotFound {
            entity_type: "Job",
            identifier: id.to_string(),
        })?;
        if job.state != from {
            return Err(VaultError::State(format!(
                "Job {} is {}, expected {}",
                id, job.state, from
            )));
        }

        let previous = job.clone();
        let now = Utc::now();
        job.state = to;
        match to {
            JobState::Claimed => job.claimed_at = Some(now),
            JobState::Finished => job.finished_at = Some(now),
            JobState::Queued => {}
        }
        let updated = job.clone();

        if let Err(e) = self.persist(&data) {
            data.insert(id, previous);
            return Err(e);
        }
        Ok(updated)
    }

    /// Queued -> Claimed; a second claim fails with `State`
    pub fn claim(&self, id: JobId) -> VaultResult<JobRecord> {
        self.set_state(id, JobState::Queued, JobState::Claimed)
    }

    /// Claimed -> Finished
    pub fn finish(&self, id: JobId) -> VaultResult<JobRecord> {
        self.set_state(id, JobState::Claimed, JobState::Finished)
    }

    /// Jobs in `state`, oldest first
    pub fn in_state(&self, state: JobState) -> VaultResult<Vec<JobRecord>> {
        let data = read_lock(&self.data)?;
        let mut jobs: Vec<_> = data.values().filter(|j| j.state == state).cloned().collect();
        jobs.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        Ok(jobs)
    }

    /// Drop Finished jobs that finished before `cutoff`
    pub fn prune_finished(&self, cutoff: DateTime<Utc>) -> VaultResult<usize> {
        let mut data = write_lock(&self.data)?;
        let before = data.len();
        data.retain(|_, j| {
            !(j.state == JobState::Finished && j.finished_at.map_or(false, |at| at < cutoff))
        });
        let removed = before - data.len();
        if removed > 0 {
            self.persist(&data)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_claim_once() {
        let temp_dir = TempDir::new().unwrap();
        let repo = JobRepository::new(temp_dir.path().join("jobs.json"));
        let job = repo.enqueue(ArtifactId::new()).unwrap();

        repo.claim(job.id).unwrap();
        assert!(repo.claim(job.id).unwrap_err().is_state());
        repo.finish(job.id).unwrap();
        assert!(repo.in_state(JobState::Claimed).unwrap().is_empty());
    }

    #[test]
    fn test_queue_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        let repo = JobRepository::new(path.clone());
        let queued = repo.enqueue(ArtifactId::new()).unwrap();
        let claimed = repo.enqueue(ArtifactId::new()).unwrap();
        repo.claim(claimed.id).unwrap();

        let reloaded = JobRepository::new(path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.in_state(JobState::Queued).unwrap()[0].id, queued.id);
        assert_eq!(reloaded.in_state(JobState::Claimed).unwrap()[0].id, claimed.id);
    }

    #[test]
    fn test_prune_finished() {
        let temp_dir = TempDir::new().unwrap();
        let repo = JobRepository::new(temp_dir.path().join("jobs.json"));
        let job = repo.enqueue(ArtifactId::new()).unwrap();
        repo.claim(job.id).unwrap();
        repo.finish(job.id).unwrap();

        assert_eq!(repo.prune_finished(Utc::now() - chrono::Duration::hours(1)).unwrap(), 0);
        assert_eq!(repo.prune_finished(Utc::now() + chrono::Duration::seconds(1)).unwrap(), 1);
    }
}
