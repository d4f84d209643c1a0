//! Artifact repository for JSON storage
//!
//! Manages loading and saving artifact records to artifacts.json. Every
//! mutation is written through to disk while the write lock is held, so the
//! file always reflects the last accepted state transition.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::{VaultError, VaultResult};
use crate::models::{ArtifactId, ArtifactStatus, BackupArtifact, BackupKind};

use super::file_io::{read_json, write_json_atomic};
use super::{read_lock, resolve_prefix, write_lock};

/// Serializable artifact data structure
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct ArtifactData {
    artifacts: Vec<BackupArtifact>,
}

/// Query filter for listing artifacts
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    pub status: Option<ArtifactStatus>,
    pub kind: Option<BackupKind>,
    /// Inclusive lower bound on `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub to: Option<DateTime<Utc>>,
}

impl ArtifactFilter {
    pub fn matches(&self, artifact: &BackupArtifact) -> bool {
        self.status.map_or(true, |s| artifact.status == s)
            && self.kind.map_or(true, |k| artifact.kind == k)
            && self.from.map_or(true, |from| artifact.created_at >= from)
            && self.to.map_or(true, |to| artifact.created_at < to)
    }
}

/// Outcome of an idempotent insert
#[derive(Debug, Clone)]
pub enum Inserted {
    Created(BackupArtifact),
    /// An artifact with the same idempotency key already existed
    Existing(BackupArtifact),
}

/// Repository for artifact persistence
pub struct ArtifactRepository {
    path: PathBuf,
    data: RwLock<HashMap<ArtifactId, BackupArtifact>>,
}

impl ArtifactRepository {
    /// Create a new artifact repository
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Load artifacts from disk
    pub fn load(&self) -> VaultResult<()> {
        let file_data: ArtifactData = read_json(&self.path)?;

        let mut data = write_lock(&self.data)?;
        data.clear();
        for artifact in file_data.artifacts {
            data.insert(artifact.id, artifact);
        }

        Ok(())
    }

    fn persist(&self, data: &HashMap<ArtifactId, BackupArtifact>) -> VaultResult<()> {
        let mut artifacts: Vec<_> = data.values().cloned().collect();
        artifacts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        write_json_atomic(&self.path, &ArtifactData { artifacts })
    }

    /// Get an artifact by ID
    pub fn get(&self, id: ArtifactId) -> VaultResult<Option<BackupArtifact>> {
        let data = read_lock(&self.data)?;
        Ok(data.get(&id).cloned())
    }

    /// Get an artifact by ID, failing with `NotFound`
    pub fn require(&self, id: ArtifactId) -> VaultResult<BackupArtifact> {
        self.get(id)?
            .ok_or_else(|| VaultError::artifact_not_found(id.to_string()))
    }

    /// Resolve a full or abbreviated artifact ID typed by an operator
    pub fn find(&self, query: &str) -> VaultResult<BackupArtifact> {
        let data = read_lock(&self.data)?;
        let id = resolve_prefix(query, data.keys().copied(), |id, q| id.matches_prefix(q))?
            .ok_or_else(|| VaultError::artifact_not_found(query))?;
        data.get(&id)
            .cloned()
            .ok_or_else(|| VaultError::artifact_not_found(query))
    }

    /// All artifacts matching `filter`, newest first
    pub fn query(&self, filter: &ArtifactFilter) -> VaultResult<Vec<BackupArtifact>> {
        let data = read_lock(&self.data)?;
        let mut artifacts: Vec<_> = data.values().filter(|a| filter.matches(a)).cloned().collect();
        artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(artifacts)
    }

    /// Get all artifacts, newest first
    pub fn get_all(&self) -> VaultResult<Vec<BackupArtifact>> {
        self.query(&ArtifactFilter::default())
    }

    /// The most recently completed artifact of any kind
    pub fn latest_completed(&self) -> VaultResult<Option<BackupArtifact>> {
        let data = read_lock(&self.data)?;
        Ok(data
            .values()
            .filter(|a| a.is_completed())
            .max_by(|a, b| {
                a.retention_anchor()
                    .cmp(&b.retention_anchor())
                    .then(a.created_at.cmp(&b.created_at))
            })
            .cloned())
    }

    /// Insert a new artifact unless one with the same idempotency key exists
    ///
    /// The lookup and the insert happen under one write lock.
    pub fn insert_idempotent(&self, artifact: BackupArtifact) -> VaultResult<Inserted> {
        let mut data = write_lock(&self.data)?;

        if let Some(key) = artifact.idempotency_key.as_deref() {
            if let Some(existing) = data
                .values()
                .find(|a| a.idempotency_key.as_deref() == Some(key))
            {
                return Ok(Inserted::Existing(existing.clone()));
            }
        }

        data.insert(artifact.id, artifact.clone());
        if let Err(e) = self.persist(&data) {
            data.remove(&artifact.id);
            return Err(e);
        }
        Ok(Inserted::Created(artifact))
    }

    /// Apply `f` to a copy of the artifact and store the result
    ///
    /// If `f` fails nothing is written, which makes this the check-and-set
    /// primitive for status transitions.
    pub fn update<F>(&self, id: ArtifactId, f: F) -> VaultResult<BackupArtifact>
    where
        F: FnOnce(&mut BackupArtifact) -> VaultResult<()>,
    {
        let mut data = write_lock(&self.data)?;
        let current = data
            .get(&id)
            .ok_or_else(|| VaultError::artifact_not_found(id.to_string()))?;

        let mut next = current.clone();
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

    /// Move an artifact from `from` to `to`, failing with `State` otherwise
    pub fn transition<F>(
        &self,
        id: ArtifactId,
        from: ArtifactStatus,
        to: ArtifactStatus,
        apply: F,
    ) -> VaultResult<BackupArtifact>
    where
        F: FnOnce(&mut BackupArtifact),
    {
        self.update(id, |artifact| {
            if artifact.status != from || !from.can_transition_to(to) {
                return Err(VaultError::State(format!(
                    "Artifact {} is {}, cannot move to {}",
                    artifact.id, artifact.status, to
                )));
            }
            artifact.status = to;
            apply(artifact);
            Ok(())
        })
    }

    /// Delete an artifact record
    pub fn delete(&self, id: ArtifactId) -> VaultResult<bool> {
        let mut data = write_lock(&self.data)?;
        let removed = data.remove(&id);
        if removed.is_some() {
            self.persist(&data)?;
        }
        Ok(removed.is_some())
    }

    /// Walk the base pointers from `id` down to its Full root
    ///
    /// Returns the chain newest first: `[id, base, base-of-base, ..., full]`.
    /// A missing member, a cycle or an Incremental without a base is an
    /// integrity failure.
    pub fn resolve_chain(&self, id: ArtifactId) -> VaultResult<Vec<BackupArtifact>> {
        let data = read_lock(&self.data)?;
        let start = data
            .get(&id)
            .ok_or_else(|| VaultError::artifact_not_found(id.to_string()))?;

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = start;

        loop {
            if !visited.insert(current.id) {
                return Err(VaultError::Integrity(format!(
                    "Cycle in backup chain of {} at {}",
                    id, current.id
                )));
            }
            chain.push(current.clone());

            match (current.kind, current.base_artifact_id) {
                (BackupKind::Full, _) => return Ok(chain),
                (BackupKind::Incremental, None) => {
                    return Err(VaultError::Integrity(format!(
                        "Incremental artifact {} has no base",
                        current.id
                    )))
                }
                (BackupKind::Incremental, Some(base)) => {
                    current = data.get(&base).ok_or_else(|| {
                        VaultError::Integrity(format!(
                            "Backup chain of {} is broken: base {} is missing",
                            id, base
                        ))
                    })?;
                }
            }
        }
    }

    /// Count artifacts
    pub fn count(&self) -> VaultResult<usize> {
        let data = read_lock(&self.data)?;
        Ok(data.len())
    }
}
