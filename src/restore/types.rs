//! Restore request and report types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ArtifactId, BackupKind, RestorePointId};

/// What `perform_restore` should do
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub artifact_id: ArtifactId,
    /// Create a restore point for the artifact after a successful restore
    pub restore_point_name: Option<String>,
    pub restore_files: bool,
    pub restore_database: bool,
    pub validate_only: bool,
    pub preview_only: bool,
    /// Overwrite conflicting live files
    pub force: bool,
}

impl RestoreOptions {
    /// Restore files and tables, refusing conflicts
    pub fn new(artifact_id: ArtifactId) -> Self {
        Self {
            artifact_id,
            restore_point_name: None,
            restore_files: true,
            restore_database: true,
            validate_only: false,
            preview_only: false,
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// A file the restore would write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewFile {
    pub path: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    /// Artifact whose payload holds the bytes
    pub source_artifact_id: ArtifactId,
}

/// A table the restore would replace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewTable {
    pub table: String,
    pub row_count: u64,
    pub changed_rows: u64,
    pub source_artifact_id: ArtifactId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The live file was modified after the backed-up version and differs
    NewerLiveFile,
}

/// A live file the restore would overwrite destructively
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreConflict {
    pub path: String,
    pub kind: ConflictKind,
    pub live_modified_at: DateTime<Utc>,
    pub backup_modified_at: DateTime<Utc>,
}

impl std::fmt::Display for RestoreConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: live copy modified {} is newer than backed-up {}",
            self.path,
            self.live_modified_at.format("%Y-%m-%d %H:%M:%S"),
            self.backup_modified_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// What restoring an artifact would touch, read from the manifest only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestorePreview {
    pub artifact_id: ArtifactId,
    pub kind: BackupKind,
    pub captured_at: DateTime<Utc>,
    /// Files whose bytes this artifact carries
    pub files: Vec<PreviewFile>,
    /// Unchanged files restored from earlier chain members
    pub inherited: Vec<PreviewFile>,
    pub tables: Vec<PreviewTable>,
    /// Paths deleted before the backup; left alone by restores
    pub removed_paths: Vec<String>,
    pub conflicts: Vec<RestoreConflict>,
    pub total_size_bytes: u64,
}

impl RestorePreview {
    pub fn file_count(&self) -> usize {
        self.files.len() + self.inherited.len()
    }
}

/// Whether a restore can proceed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestoreValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Destructive overwrites that need `force`
    pub conflicts: Vec<RestoreConflict>,
    /// Chain members the restore reads, newest first
    pub chain: Vec<ArtifactId>,
}

/// Outcome of an applied restore
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestoreResult {
    pub success: bool,
    pub artifact_id: Option<ArtifactId>,
    pub files_restored: usize,
    pub tables_restored: usize,
    pub database_restored: bool,
    pub validation_errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_point_id: Option<RestorePointId>,
    /// Full backup taken just before a rollback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_snapshot_id: Option<ArtifactId>,
}

impl RestoreResult {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        parts.push(format!("{} file(s)", self.files_restored));
        parts.push(format!("{} table(s)", self.tables_restored));
        let status = if self.success { "Restored" } else { "Partially restored" };
        format!("{} {} in {}ms", status, parts.join(" and "), self.duration_ms)
    }
}

/// What `perform_restore` produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Preview(RestorePreview),
    Validation(RestoreValidation),
    Applied(RestoreResult),
}
