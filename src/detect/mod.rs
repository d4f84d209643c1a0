//! Change detection
//!
//! Computes what changed since a base artifact, for files (size/mtime, then
//! SHA-256) and for tables (row counts plus a watermark approximation).
//! Detection is read-only and never cached: two calls over an unchanged tree
//! return the same result.

mod tree;

pub use tree::{hash_file, resolve_manifest_path, scan_roots, FileState, ScannedFile};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::{ArtifactReader, IndexedFile, Manifest};
use crate::config::TrackedRoot;
use crate::dataset::DatasetStore;
use crate::error::{VaultError, VaultResult};
use crate::models::{ArtifactId, BackupArtifact};
use crate::storage::ArtifactRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub hash: String,
    pub change: ChangeKind,
}

/// Per-table change estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableChange {
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_water_mark: Option<DateTime<Utc>>,
    /// Rows with a newer watermark plus rows that disappeared
    pub changed_rows: u64,
    pub changed: bool,
}

/// What changed since a base artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub resolved_base_artifact_id: Option<ArtifactId>,
    pub changed_files: Vec<ChangedFile>,
    pub removed_paths: Vec<String>,
    pub total_size_bytes: u64,
    pub table_changes: BTreeMap<String, TableChange>,
    /// No base was available, so everything is new
    pub is_full_tree: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed_files.is_empty()
            && self.removed_paths.is_empty()
            && self.table_changes.values().all(|t| !t.changed)
    }
}

/// A completed artifact's record and manifest
#[derive(Debug, Clone)]
pub struct BaseSnapshot {
    pub artifact: BackupArtifact,
    pub manifest: Manifest,
}

impl BaseSnapshot {
    pub fn effective_index(&self) -> BTreeMap<String, IndexedFile> {
        self.manifest.effective_index(self.artifact.id)
    }
}

/// Everything packaging needs: the scan plus the derived change set
#[derive(Debug, Clone)]
pub struct Detection {
    pub base: Option<BaseSnapshot>,
    pub files: BTreeMap<String, ScannedFile>,
    pub changes: ChangeSet,
}

pub struct ChangeDetector {
    artifacts: Arc<ArtifactRepository>,
    roots: Vec<TrackedRoot>,
    dataset: Arc<dyn DatasetStore>,
}

impl ChangeDetector {
    pub fn new(
        artifacts: Arc<ArtifactRepository>,
        roots: Vec<TrackedRoot>,
        dataset: Arc<dyn DatasetStore>,
    ) -> Self {
        Self {
            artifacts,
            roots,
            dataset,
        }
    }

    pub fn roots(&self) -> &[TrackedRoot] {
        &self.roots
    }

    pub fn dataset(&self) -> &Arc<dyn DatasetStore> {
        &self.dataset
    }

    /// Load a Completed artifact and its manifest
    ///
    /// A missing or not-yet-completed artifact is `NotFound`.
    pub fn load_base(&self, id: ArtifactId) -> VaultResult<BaseSnapshot> {
        let artifact = self
            .artifacts
            .get(id)?
            .filter(|a| a.is_completed())
            .ok_or_else(|| VaultError::artifact_not_found(format!("{} (completed)", id)))?;
        let path: PathBuf = artifact.file_path.clone().ok_or_else(|| {
            VaultError::Integrity(format!("Artifact {} has no file on record", id))
        })?;
        let manifest = ArtifactReader::open(path)?.into_header().manifest;
        Ok(BaseSnapshot { artifact, manifest })
    }

    /// Resolve the base: the given one, else the latest Completed artifact
    pub fn resolve_base(&self, base: Option<ArtifactId>) -> VaultResult<Option<BaseSnapshot>> {
        match base {
            Some(id) => self.load_base(id).map(Some),
            None => match self.artifacts.latest_completed()? {
                Some(latest) => self.load_base(latest.id).map(Some),
                None => Ok(None),
            },
        }
    }

    /// Public, read-only change detection
    pub fn detect_changes(&self, base: Option<ArtifactId>) -> VaultResult<ChangeSet> {
        let base = self.resolve_base(base)?;
        Ok(self.detect_against(base, &mut || Ok(()))?.changes)
    }

    /// Scan against an already-resolved base
    pub fn detect_against(
        &self,
        base: Option<BaseSnapshot>,
        checkpoint: &mut dyn FnMut() -> VaultResult<()>,
    ) -> VaultResult<Detection> {
        let index = base.as_ref().map(BaseSnapshot::effective_index);
        let files = scan_roots(&self.roots, index.as_ref(), checkpoint)?;

        let mut changed_files = Vec::new();
        for scanned in files.values() {
            let change = match scanned.state {
                FileState::Added => ChangeKind::Added,
                FileState::Modified => ChangeKind::Modified,
                FileState::Unchanged(_) => continue,
            };
            changed_files.push(ChangedFile {
                path: scanned.entry.path.clone(),
                size_bytes: scanned.entry.size_bytes,
                modified_at: scanned.entry.modified_at,
                hash: scanned.entry.sha256.clone(),
                change,
            });
        }

        let removed_paths: Vec<String> = index
            .as_ref()
            .map(|idx| {
                idx.keys()
                    .filter(|path| !files.contains_key(*path))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let table_changes = self.table_changes(base.as_ref())?;
        let total_size_bytes = changed_files.iter().map(|f| f.size_bytes).sum();

        let changes = ChangeSet {
            resolved_base_artifact_id: base.as_ref().map(|b| b.artifact.id),
            changed_files,
            removed_paths,
            total_size_bytes,
            table_changes,
            is_full_tree: base.is_none(),
        };
        debug!(
            base = ?changes.resolved_base_artifact_id,
            changed = changes.changed_files.len(),
            removed = changes.removed_paths.len(),
            "change detection finished"
        );

        Ok(Detection {
            base,
            files,
            changes,
        })
    }

    fn table_changes(
        &self,
        base: Option<&BaseSnapshot>,
    ) -> VaultResult<BTreeMap<String, TableChange>> {
        let mut changes = BTreeMap::new();
        for table in self.dataset.tables()? {
            let stats = self.dataset.table_stats(&table)?;
            let previous = base.and_then(|b| b.manifest.tables.get(&table).map(|m| (b, m)));

            let change = match previous {
                None => TableChange {
                    row_count: stats.row_count,
                    high_water_mark: stats.high_water_mark,
                    changed_rows: stats.row_count,
                    changed: true,
                },
                Some((snapshot, meta)) => {
                    let newer = self
                        .dataset
                        .rows_modified_since(&table, snapshot.manifest.captured_at)?;
                    let disappeared = meta.row_count.saturating_sub(stats.row_count);
                    let changed_rows = newer + disappeared;
                    TableChange {
                        row_count: stats.row_count,
                        high_water_mark: stats.high_water_mark,
                        changed_rows,
                        changed: changed_rows > 0
                            || stats.row_count != meta.row_count
                            || stats.high_water_mark != meta.high_water_mark,
                    }
                }
            };
            changes.insert(table, change);
        }
        Ok(changes)
    }
}
