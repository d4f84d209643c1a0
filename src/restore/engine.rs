//! Restore engine
//!
//! Previews and validations read artifact headers only. Applying a restore
//! decodes the payloads of every chain member it needs, writes each file
//! atomically and imports each table atomically, so a failure never leaves a
//! single file or table half-written.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::{check_key, sha256_hex, ArtifactReader, IndexedFile, Manifest, PayloadBody};
use crate::audit::{AuditAction, AuditEntry, AuditLogger, SubjectType};
use crate::backup::{BackupOrchestrator, CreateBackupRequest, ExecutionGuard};
use crate::config::settings::RestoreSettings;
use crate::config::TrackedRoot;
use crate::crypto::DerivedKey;
use crate::dataset::DatasetStore;
use crate::detect::{hash_file, resolve_manifest_path};
use crate::error::{VaultError, VaultResult};
use crate::models::{ArtifactId, BackupArtifact, RestorePoint};
use crate::notify::{Notification, NotificationSink};
use crate::storage::{write_bytes_atomic, Storage};

use super::types::{
    ConflictKind, PreviewFile, PreviewTable, RestoreConflict, RestoreOptions, RestoreOutcome,
    RestorePreview, RestoreResult, RestoreValidation,
};

const MAX_POINT_NAME_LEN: usize = 100;

pub struct RestoreEngine {
    storage: Arc<Storage>,
    audit: Arc<AuditLogger>,
    orchestrator: Arc<BackupOrchestrator>,
    notifier: Arc<dyn NotificationSink>,
    settings: RestoreSettings,
    lock: Mutex<()>,
}

impl RestoreEngine {
    pub fn new(
        storage: Arc<Storage>,
        audit: Arc<AuditLogger>,
        orchestrator: Arc<BackupOrchestrator>,
        notifier: Arc<dyn NotificationSink>,
        settings: RestoreSettings,
    ) -> Self {
        Self {
            storage,
            audit,
            orchestrator,
            notifier,
            settings,
            lock: Mutex::new(()),
        }
    }

    fn completed_artifact(&self, id: ArtifactId) -> VaultResult<BackupArtifact> {
        let artifact = self.storage.artifacts.require(id)?;
        if !artifact.is_completed() {
            return Err(VaultError::State(format!(
                "Artifact {} is {}, only COMPLETED artifacts can be restored",
                artifact.id, artifact.status
            )));
        }
        Ok(artifact)
    }

    fn open(artifact: &BackupArtifact) -> VaultResult<ArtifactReader> {
        let path = artifact.file_path.as_ref().ok_or_else(|| {
            VaultError::Integrity(format!("Artifact {} has no file on record", artifact.id))
        })?;
        ArtifactReader::open(path)
    }

    /// What restoring `id` would write, from the manifest alone
    pub fn preview(&self, id: ArtifactId) -> VaultResult<RestorePreview> {
        let artifact = self.completed_artifact(id)?;
        let reader = Self::open(&artifact)?;
        let header = reader.header();
        let manifest = &header.manifest;
        let index = manifest.effective_index(id);

        let files = manifest
            .files
            .iter()
            .map(|f| PreviewFile {
                path: f.path.clone(),
                size_bytes: f.size_bytes,
                modified_at: f.modified_at,
                source_artifact_id: id,
            })
            .collect();
        let inherited = manifest
            .inherited
            .iter()
            .map(|i| PreviewFile {
                path: i.file.path.clone(),
                size_bytes: i.file.size_bytes,
                modified_at: i.file.modified_at,
                source_artifact_id: i.source_artifact_id,
            })
            .collect();
        let tables = manifest
            .tables
            .iter()
            .map(|(table, meta)| PreviewTable {
                table: table.clone(),
                row_count: meta.row_count,
                changed_rows: meta.changed_rows,
                source_artifact_id: meta.source_artifact_id,
            })
            .collect();

        Ok(RestorePreview {
            artifact_id: id,
            kind: header.kind,
            captured_at: manifest.captured_at,
            files,
            inherited,
            tables,
            removed_paths: manifest.removed.clone(),
            conflicts: find_conflicts(&manifest.roots, &index),
            total_size_bytes: index.values().map(|i| i.file.size_bytes).sum(),
        })
    }

    /// Check that `id` can be restored
    ///
    /// Only an unknown artifact is an error; every other problem is reported
    /// in the returned validation.
    pub fn validate(&self, id: ArtifactId) -> VaultResult<RestoreValidation> {
        let artifact = self.storage.artifacts.require(id)?;
        let mut validation = RestoreValidation::default();
        self.check(&artifact, &mut validation);
        validation.is_valid = validation.errors.is_empty();
        debug!(artifact_id = %id, valid = validation.is_valid, "restore validated");
        Ok(validation)
    }

    fn check(&self, artifact: &BackupArtifact, validation: &mut RestoreValidation) {
        if !artifact.is_completed() {
            validation.errors.push(format!(
                "Artifact {} is {}, not COMPLETED",
                artifact.id, artifact.status
            ));
            return;
        }
        let manifest = match Self::open(artifact) {
            Ok(reader) => reader.into_header().manifest,
            Err(e) => {
                validation.errors.push(e.to_string());
                return;
            }
        };
        let chain = match self.storage.artifacts.resolve_chain(artifact.id) {
            Ok(chain) => chain,
            Err(e) => {
                validation.errors.push(e.to_string());
                return;
            }
        };
        validation.chain = chain.iter().map(|a| a.id).collect();

        let index = manifest.effective_index(artifact.id);
        let needed = needed_sources(&manifest, &index);
        let key = self.orchestrator.key();

        for source in &needed {
            let Some(member) = chain.iter().find(|a| a.id == *source) else {
                validation.errors.push(format!(
                    "Manifest references {} which is not in the backup chain",
                    source
                ));
                continue;
            };
            if !member.is_completed() {
                validation.errors.push(format!(
                    "Chain member {} is {}, not COMPLETED",
                    member.id, member.status
                ));
                continue;
            }
            let reader = match Self::open(member) {
                Ok(reader) => reader,
                Err(e) => {
                    validation.errors.push(e.to_string());
                    continue;
                }
            };
            if let Err(e) = reader.verify() {
                validation
                    .errors
                    .push(format!("Chain member {}: {}", member.id, e));
            }
            if let Err(e) = check_key(reader.header(), key) {
                validation.errors.push(e.to_string());
            }
        }

        if !manifest.removed.is_empty() {
            validation.warnings.push(format!(
                "{} file(s) deleted before the backup will be left in place",
                manifest.removed.len()
            ));
        }
        if manifest.roots.is_empty() && !index.is_empty() {
            validation
                .errors
                .push("Manifest records files but no tracked roots".into());
        }

        validation.conflicts = find_conflicts(&manifest.roots, &index);
        if !validation.conflicts.is_empty() {
            validation.warnings.push(format!(
                "{} live file(s) are newer than the backup and would be overwritten",
                validation.conflicts.len()
            ));
        }
    }

    /// Preview, validate, or apply a restore
    pub async fn perform_restore(
        &self,
        options: RestoreOptions,
        actor: &str,
    ) -> VaultResult<RestoreOutcome> {
        let id = options.artifact_id;
        if options.preview_only {
            let preview = self.preview(id)?;
            self.audit.record(AuditEntry::info(
                SubjectType::Artifact,
                id.full(),
                AuditAction::RestorePreviewed,
                format!(
                    "Previewed restore of {} file(s), {} table(s)",
                    preview.file_count(),
                    preview.tables.len()
                ),
                actor,
            ));
            return Ok(RestoreOutcome::Preview(preview));
        }
        if options.validate_only {
            let validation = self.validate(id)?;
            self.audit.record(
                AuditEntry::info(
                    SubjectType::Artifact,
                    id.full(),
                    AuditAction::RestoreValidated,
                    format!(
                        "Restore validation {}",
                        if validation.is_valid { "passed" } else { "failed" }
                    ),
                    actor,
                )
                .with_details(&validation.errors),
            );
            return Ok(RestoreOutcome::Validation(validation));
        }

        let _held = self.try_lock()?;
        self.apply_locked(options, actor, Vec::new())
            .await
            .map(RestoreOutcome::Applied)
    }

    fn try_lock(&self) -> VaultResult<tokio::sync::MutexGuard<'_, ()>> {
        self.lock
            .try_lock()
            .map_err(|_| VaultError::Conflict("Another restore is already running".into()))
    }

    async fn apply_locked(
        &self,
        options: RestoreOptions,
        actor: &str,
        warnings: Vec<String>,
    ) -> VaultResult<RestoreResult> {
        let started = Instant::now();
        let id = options.artifact_id;
        let validation = self.validate(id)?;

        let mut result = RestoreResult {
            artifact_id: Some(id),
            warnings,
            ..RestoreResult::default()
        };
        result.warnings.extend(validation.warnings.iter().cloned());

        if !validation.is_valid {
            result.validation_errors = validation.errors;
            result.duration_ms = elapsed_ms(started);
            self.report(&result, actor);
            return Ok(result);
        }
        if !validation.conflicts.is_empty() {
            if !options.force {
                return Err(VaultError::Conflict(format!(
                    "{} live file(s) are newer than the backup; force the restore to overwrite them",
                    validation.conflicts.len()
                )));
            }
            result
                .warnings
                .extend(validation.conflicts.iter().map(|c| format!("Overwrote {}", c)));
        }

        let artifact = self.completed_artifact(id)?;
        let manifest = Self::open(&artifact)?.into_header().manifest;
        let index = manifest.effective_index(id);
        let needed = needed_sources(&manifest, &index);
        let mut members = Vec::new();
        for source in needed {
            let member = self.storage.artifacts.require(source)?;
            if let Some(path) = member.file_path {
                members.push((source, path));
            }
        }

        let job = ApplyJob {
            own_id: id,
            manifest,
            members,
            key: self.orchestrator.key_handle(),
            dataset: Arc::clone(self.orchestrator.detector().dataset()),
            restore_files: options.restore_files,
            restore_database: options.restore_database,
        };
        let guard = ExecutionGuard::new(
            "Restore",
            CancellationToken::new(),
            self.settings.timeout(),
        );
        let applied = tokio::task::spawn_blocking(move || apply(job, &guard))
            .await
            .map_err(|e| VaultError::Io(format!("Restore worker panicked: {}", e)))?;

        result.files_restored = applied.files_restored;
        result.tables_restored = applied.tables_restored;
        result.database_restored = options.restore_database && applied.all_tables_restored;
        result.size_bytes = applied.size_bytes;
        result.validation_errors = applied.errors;
        result.success = result.validation_errors.is_empty();

        if result.success {
            if let Some(name) = options.restore_point_name {
                match self.create_restore_point(id, &name, "Created after restore", actor) {
                    Ok(point) => result.restore_point_id = Some(point.id),
                    Err(e) => result.warnings.push(format!("Restore point not created: {}", e)),
                }
            }
        }

        result.duration_ms = elapsed_ms(started);
        self.report(&result, actor);
        Ok(result)
    }

    fn report(&self, result: &RestoreResult, actor: &str) {
        let Some(id) = result.artifact_id else {
            return;
        };
        let now = Utc::now();
        if result.success {
            info!(
                artifact_id = %id,
                files = result.files_restored,
                tables = result.tables_restored,
                "restore completed"
            );
            self.audit.record(
                AuditEntry::success(
                    SubjectType::Artifact,
                    id.full(),
                    AuditAction::RestoreCompleted,
                    result.summary(),
                    actor,
                )
                .with_details(result),
            );
            self.notifier.notify(&Notification::RestoreCompleted {
                artifact_id: id,
                files_restored: result.files_restored,
                tables_restored: result.tables_restored,
                timestamp: now,
            });
        } else {
            warn!(artifact_id = %id, errors = ?result.validation_errors, "restore failed");
            self.audit.record(
                AuditEntry::failure(
                    SubjectType::Artifact,
                    id.full(),
                    AuditAction::RestoreFailed,
                    result.summary(),
                    actor,
                )
                .with_details(result),
            );
            self.notifier.notify(&Notification::RestoreFailed {
                artifact_id: id,
                errors: result.validation_errors.clone(),
                timestamp: now,
            });
        }
    }

    /// Name a Completed artifact as a rollback target
    pub fn create_restore_point(
        &self,
        artifact_id: ArtifactId,
        name: &str,
        description: &str,
        actor: &str,
    ) -> VaultResult<RestorePoint> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation("Restore point name cannot be empty".into()));
        }
        if name.len() > MAX_POINT_NAME_LEN {
            return Err(VaultError::Validation(format!(
                "Restore point name too long ({} chars, max {})",
                name.len(),
                MAX_POINT_NAME_LEN
            )));
        }

        let artifact = self.storage.artifacts.require(artifact_id)?;
        if !artifact.is_completed() {
            return Err(VaultError::State(format!(
                "Artifact {} is {}, restore points need a COMPLETED artifact",
                artifact.id, artifact.status
            )));
        }

        let point = self
            .storage
            .restore_points
            .insert_unique(RestorePoint::new(artifact_id, name, description, actor))?;
        self.audit.record(AuditEntry::success(
            SubjectType::RestorePoint,
            point.id.full(),
            AuditAction::RestorePointCreated,
            format!("Restore point '{}' created for {}", point.name, artifact_id),
            actor,
        ));
        Ok(point)
    }

    /// Restore everything a restore point references, overwriting conflicts
    ///
    /// With `safety_snapshot` enabled a Full backup of the current state is
    /// taken first; the rollback is refused if that backup fails.
    pub async fn rollback_to_restore_point(
        &self,
        query: &str,
        actor: &str,
    ) -> VaultResult<RestoreResult> {
        let point = self.storage.restore_points.find(query)?;
        if !point.is_usable() {
            return Err(VaultError::State(format!(
                "Restore point '{}' is {}",
                point.name, point.status
            )));
        }
        let _held = self.try_lock()?;
        self.completed_artifact(point.artifact_id)?;

        let mut warnings = Vec::new();
        let mut safety_snapshot_id = None;
        if self.settings.safety_snapshot {
            let request = CreateBackupRequest::full(actor)
                .with_name(format!("pre-rollback-{}", point.name))
                .with_description("Safety snapshot taken before rollback");
            let snapshot = self.orchestrator.create_backup_and_wait(request).await?;
            if !snapshot.is_completed() {
                return Err(VaultError::State(format!(
                    "Safety snapshot {} failed, rollback not attempted: {}",
                    snapshot.id,
                    snapshot.error_message.unwrap_or_default()
                )));
            }
            warnings.push(format!("Safety snapshot {} taken before rollback", snapshot.id));
            safety_snapshot_id = Some(snapshot.id);
        }

        let options = RestoreOptions::new(point.artifact_id).forced();
        let mut result = self.apply_locked(options, actor, warnings).await?;
        result.safety_snapshot_id = safety_snapshot_id;

        if result.success {
            let now = Utc::now();
            self.storage.restore_points.update(point.id, |p| {
                p.mark_used(now);
                Ok(())
            })?;
            self.audit.record(AuditEntry::success(
                SubjectType::RestorePoint,
                point.id.full(),
                AuditAction::Rollback,
                format!("Rolled back to '{}': {}", point.name, result.summary()),
                actor,
            ));
        } else {
            self.audit.record(
                AuditEntry::failure(
                    SubjectType::RestorePoint,
                    point.id.full(),
                    AuditAction::Rollback,
                    format!("Rollback to '{}' failed", point.name),
                    actor,
                )
                .with_details(&result.validation_errors),
            );
        }
        Ok(result)
    }

    pub fn list_restore_points(&self) -> VaultResult<Vec<RestorePoint>> {
        self.storage.restore_points.get_all()
    }

    /// Find a restore point by name or ID prefix
    pub fn get_restore_point(&self, query: &str) -> VaultResult<RestorePoint> {
        self.storage.restore_points.find(query)
    }

    pub fn expire_restore_points_for(
        &self,
        artifact_id: ArtifactId,
        actor: &str,
    ) -> VaultResult<usize> {
        let expired = self.storage.restore_points.expire_for_artifact(artifact_id)?;
        if expired > 0 {
            self.audit.record(AuditEntry::info(
                SubjectType::Artifact,
                artifact_id.full(),
                AuditAction::RestorePointExpired,
                format!("{} restore point(s) expired", expired),
                actor,
            ));
        }
        Ok(expired)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Artifacts whose payloads hold some file or table of this manifest
fn needed_sources(manifest: &Manifest, index: &BTreeMap<String, IndexedFile>) -> BTreeSet<ArtifactId> {
    index
        .values()
        .map(|i| i.source_artifact_id)
        .chain(manifest.tables.values().map(|t| t.source_artifact_id))
        .collect()
}

/// Live files modified after, and different from, their backed-up version
fn find_conflicts(
    roots: &[TrackedRoot],
    index: &BTreeMap<String, IndexedFile>,
) -> Vec<RestoreConflict> {
    let mut conflicts = Vec::new();
    for (path, indexed) in index {
        let Some(live) = resolve_manifest_path(roots, path) else {
            continue;
        };
        let Ok(modified) = std::fs::metadata(&live).and_then(|m| m.modified()) else {
            continue;
        };
        let live_modified_at: DateTime<Utc> = modified.into();
        if live_modified_at <= indexed.file.modified_at {
            continue;
        }
        if hash_file(&live).map_or(true, |hash| hash != indexed.file.sha256) {
            conflicts.push(RestoreConflict {
                path: path.clone(),
                kind: ConflictKind::NewerLiveFile,
                live_modified_at,
                backup_modified_at: indexed.file.modified_at,
            });
        }
    }
    conflicts
}

struct ApplyJob {
    own_id: ArtifactId,
    manifest: Manifest,
    members: Vec<(ArtifactId, PathBuf)>,
    key: Option<Arc<DerivedKey>>,
    dataset: Arc<dyn DatasetStore>,
    restore_files: bool,
    restore_database: bool,
}

#[derive(Debug, Default)]
struct Applied {
    files_restored: usize,
    tables_restored: usize,
    all_tables_restored: bool,
    size_bytes: u64,
    errors: Vec<String>,
}

fn apply(job: ApplyJob, guard: &ExecutionGuard) -> Applied {
    let mut applied = Applied::default();

    let mut payloads: HashMap<ArtifactId, PayloadBody> = HashMap::new();
    for (id, path) in &job.members {
        let payload = ArtifactReader::open(path).and_then(|r| r.read_payload(job.key.as_deref()));
        match payload {
            Ok(payload) => {
                payloads.insert(*id, payload);
            }
            Err(e) => {
                applied.errors.push(format!("Chain member {}: {}", id, e));
                return applied;
            }
        }
    }

    if job.restore_files {
        let index = job.manifest.effective_index(job.own_id);
        for (path, indexed) in &index {
            if let Err(e) = guard.checkpoint() {
                applied.errors.push(e.to_string());
                return applied;
            }
            match restore_file(&job.manifest.roots, path, indexed, &payloads) {
                Ok(size) => {
                    applied.files_restored += 1;
                    applied.size_bytes += size;
                }
                Err(e) => applied.errors.push(format!("{}: {}", path, e)),
            }
        }
    }

    if job.restore_database {
        for (table, meta) in &job.manifest.tables {
            if let Err(e) = guard.checkpoint() {
                applied.errors.push(e.to_string());
                return applied;
            }
            let export = payloads
                .get(&meta.source_artifact_id)
                .and_then(|p| p.tables.iter().find(|t| &t.table == table));
            let imported = match export {
                Some(export) => job.dataset.import_table(export),
                None => Err(VaultError::Integrity(format!(
                    "Export missing from artifact {}",
                    meta.source_artifact_id
                ))),
            };
            match imported {
                Ok(rows) => {
                    debug!(%table, rows, "table imported");
                    applied.tables_restored += 1;
                }
                Err(e) => applied.errors.push(format!("table {}: {}", table, e)),
            }
        }
        applied.all_tables_restored = applied.tables_restored == job.manifest.tables.len();
    }

    applied
}

fn restore_file(
    roots: &[TrackedRoot],
    path: &str,
    indexed: &IndexedFile,
    payloads: &HashMap<ArtifactId, PayloadBody>,
) -> VaultResult<u64> {
    let encoded = payloads
        .get(&indexed.source_artifact_id)
        .and_then(|p| p.files.get(path))
        .ok_or_else(|| {
            VaultError::Integrity(format!(
                "Bytes missing from artifact {}",
                indexed.source_artifact_id
            ))
        })?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| VaultError::Integrity(format!("Corrupt file contents: {}", e)))?;
    if sha256_hex(&bytes) != indexed.file.sha256 {
        return Err(VaultError::Integrity("Checksum mismatch".into()));
    }

    let target = resolve_manifest_path(roots, path)
        .ok_or_else(|| VaultError::Validation("Path is outside the tracked roots".into()))?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_bytes_atomic(&target, &bytes)?;

    // restored files keep their backed-up mtime so the next scan sees them unchanged
    std::fs::File::options()
        .write(true)
        .open(&target)?
        .set_modified(SystemTime::from(indexed.file.modified_at))?;

    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{ArtifactDirs, OrchestratorConfig};
    use crate::config::VaultPaths;
    use crate::dataset::JsonDatasetStore;
    use crate::detect::ChangeDetector;
    use crate::models::{ArtifactStatus, BackupKind, CompressionLevel, RestorePointStatus, StorageLocation};
    use crate::notify::TracingNotifier;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        tables: PathBuf,
        storage: Arc<Storage>,
        orchestrator: Arc<BackupOrchestrator>,
        engine: RestoreEngine,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp.path().join("vault"));
        let storage = Arc::new(Storage::open(paths.clone()).unwrap());
        let root = temp.path().join("records");
        let tables = paths.tables_dir();
        std::fs::create_dir_all(root.join("2025")).unwrap();
        std::fs::create_dir_all(&tables).unwrap();
        std::fs::write(root.join("roster.csv"), "id,name\n1,Ada\n").unwrap();
        std::fs::write(root.join("2025/jan.csv"), "1,present\n").unwrap();
        std::fs::write(
            tables.join("attendance.json"),
            serde_json::to_vec(&json!({"rows": [
                {"id": 1, "status": "present", "updated_at": "2025-01-06T08:00:00Z"}
            ]}))
            .unwrap(),
        )
        .unwrap();

        let dataset: Arc<dyn DatasetStore> =
            Arc::new(JsonDatasetStore::new(tables.clone(), vec![], "updated_at"));
        let detector = Arc::new(ChangeDetector::new(
            Arc::clone(&storage.artifacts),
            vec![TrackedRoot::new("records", &root)],
            dataset,
        ));
        let audit = Arc::new(AuditLogger::new(paths.audit_log()));
        let orchestrator = Arc::new(BackupOrchestrator::new(
            Arc::clone(&storage),
            Arc::clone(&audit),
            detector,
            Arc::new(TracingNotifier),
            None,
            OrchestratorConfig {
                worker_pool_size: 2,
                timeout: Duration::from_secs(60),
                default_compression: CompressionLevel::Medium,
                default_retention_days: 30,
                dirs: ArtifactDirs {
                    artifacts_dir: paths.artifacts_dir(),
                    temp_dir: paths.temp_dir(),
                },
            },
        ));
        let engine = RestoreEngine::new(
            Arc::clone(&storage),
            audit,
            Arc::clone(&orchestrator),
            Arc::new(TracingNotifier),
            RestoreSettings::default(),
        );
        Fixture {
            _temp: temp,
            root,
            tables,
            storage,
            orchestrator,
            engine,
        }
    }

    async fn full_backup(fx: &Fixture) -> BackupArtifact {
        let artifact = fx
            .orchestrator
            .create_backup_and_wait(CreateBackupRequest::full("registrar"))
            .await
            .unwrap();
        assert_eq!(artifact.status, ArtifactStatus::Completed);
        artifact
    }

    fn applied(outcome: RestoreOutcome) -> RestoreResult {
        match outcome {
            RestoreOutcome::Applied(result) => result,
            other => panic!("expected an applied restore, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_preview_reads_manifest() {
        let fx = fixture();
        let full = full_backup(&fx).await;

        let preview = fx.engine.preview(full.id).unwrap();
        assert_eq!(preview.kind, BackupKind::Full);
        assert_eq!(preview.files.len(), 2);
        assert!(preview.inherited.is_empty());
        assert_eq!(preview.tables[0].table, "attendance");
        assert!(preview.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_restore_round_trip_leaves_nothing_to_back_up() {
        let fx = fixture();
        let full = full_backup(&fx).await;

        std::fs::write(fx.root.join("roster.csv"), "scribbled over").unwrap();
        std::fs::remove_file(fx.root.join("2025/jan.csv")).unwrap();
        std::fs::write(
            fx.tables.join("attendance.json"),
            serde_json::to_vec(&json!({"rows": []})).unwrap(),
        )
        .unwrap();

        let result = applied(
            fx.engine
                .perform_restore(RestoreOptions::new(full.id).forced(), "registrar")
                .await
                .unwrap(),
        );
        assert!(result.success, "{:?}", result.validation_errors);
        assert_eq!(result.files_restored, 2);
        assert_eq!(result.tables_restored, 1);
        assert!(result.database_restored);
        assert_eq!(
            std::fs::read_to_string(fx.root.join("roster.csv")).unwrap(),
            "id,name\n1,Ada\n"
        );
        assert!(fx.root.join("2025/jan.csv").exists());

        let changes = fx.orchestrator.detector().detect_changes(Some(full.id)).unwrap();
        assert!(changes.changed_files.is_empty());
        assert!(changes.is_empty());

        let incr = fx
            .orchestrator
            .create_backup_and_wait(CreateBackupRequest::incremental("registrar"))
            .await
            .unwrap();
        let preview = fx.engine.preview(incr.id).unwrap();
        assert!(preview.files.is_empty());
        assert_eq!(preview.inherited.len(), 2);
    }

    #[tokio::test]
    async fn test_newer_live_file_needs_force() {
        let fx = fixture();
        let full = full_backup(&fx).await;
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(fx.root.join("roster.csv"), "id,name\n1,Ada\n2,Grace\n").unwrap();

        let validation = fx.engine.validate(full.id).unwrap();
        assert!(validation.is_valid);
        assert_eq!(validation.conflicts.len(), 1);
        assert_eq!(validation.conflicts[0].path, "records/roster.csv");

        let err = fx
            .engine
            .perform_restore(RestoreOptions::new(full.id), "registrar")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(std::fs::read_to_string(fx.root.join("roster.csv"))
            .unwrap()
            .contains("Grace"));
    }

    #[tokio::test]
    async fn test_concurrent_restore_is_refused() {
        let fx = fixture();
        let full = full_backup(&fx).await;

        let _held = fx.engine.lock.try_lock().unwrap();
        let err = fx
            .engine
            .perform_restore(RestoreOptions::new(full.id).forced(), "registrar")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_corrupted_artifact_reports_errors_without_writing() {
        let fx = fixture();
        let full = full_backup(&fx).await;
        let path = full.file_path.clone().unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();
        std::fs::write(fx.root.join("roster.csv"), "keep me").unwrap();

        let mut options = RestoreOptions::new(full.id).forced();
        options.validate_only = true;
        match fx.engine.perform_restore(options, "registrar").await.unwrap() {
            RestoreOutcome::Validation(v) => assert!(!v.is_valid),
            other => panic!("expected a validation, got {:?}", other),
        }

        let result = applied(
            fx.engine
                .perform_restore(RestoreOptions::new(full.id).forced(), "registrar")
                .await
                .unwrap(),
        );
        assert!(!result.success);
        assert_eq!(result.files_restored, 0);
        assert!(result.validation_errors[0].contains("checksum"));
        assert_eq!(std::fs::read_to_string(fx.root.join("roster.csv")).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn test_restore_point_requires_completed_artifact() {
        let fx = fixture();
        let pending = BackupArtifact::new(BackupKind::Full, StorageLocation::Local, "registrar");
        let pending_id = pending.id;
        fx.storage.artifacts.insert_idempotent(pending).unwrap();
        assert!(fx
            .engine
            .create_restore_point(pending_id, "too-early", "", "registrar")
            .unwrap_err()
            .is_state());

        let full = full_backup(&fx).await;
        fx.engine
            .create_restore_point(full.id, "start-of-term", "", "registrar")
            .unwrap();
        assert!(fx
            .engine
            .create_restore_point(full.id, "start-of-term", "", "registrar")
            .unwrap_err()
            .is_conflict());
    }

    #[tokio::test]
    async fn test_rollback_takes_snapshot_and_marks_point_used() {
        let fx = fixture();
        let full = full_backup(&fx).await;
        let point = fx
            .engine
            .create_restore_point(full.id, "start-of-term", "", "registrar")
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(fx.root.join("roster.csv"), "mangled").unwrap();

        let result = fx
            .engine
            .rollback_to_restore_point("start-of-term", "registrar")
            .await
            .unwrap();
        assert!(result.success);
        let snapshot = result.safety_snapshot_id.unwrap();
        assert_eq!(
            fx.storage.artifacts.require(snapshot).unwrap().status,
            ArtifactStatus::Completed
        );
        assert_eq!(
            std::fs::read_to_string(fx.root.join("roster.csv")).unwrap(),
            "id,name\n1,Ada\n"
        );

        fx.engine
            .rollback_to_restore_point(&point.id.to_string(), "registrar")
            .await
            .unwrap();
        let used = fx.engine.get_restore_point("start-of-term").unwrap();
        assert_eq!(used.status, RestorePointStatus::Used);
        assert_eq!(used.use_count, 2);

        assert_eq!(fx.engine.expire_restore_points_for(full.id, "registrar").unwrap(), 1);
        assert!(fx
            .engine
            .rollback_to_restore_point("start-of-term", "registrar")
            .await
            .unwrap_err()
            .is_state());
    }
}
