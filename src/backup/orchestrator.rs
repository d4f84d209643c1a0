//! Backup orchestration
//!
//! `create_backup` records a Pending artifact and a durable job, then hands
//! the job to a bounded worker pool and returns. Workers claim the job, move
//! the artifact to InProgress with a check-and-set, package it on a blocking
//! thread and record the terminal status.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditAction, AuditEntry, AuditLogger, SubjectType};
use crate::crypto::DerivedKey;
use crate::detect::ChangeDetector;
use crate::error::{VaultError, VaultResult};
use crate::models::{
    ArtifactId, ArtifactStatus, BackupArtifact, BackupKind, CompressionLevel, JobRecord, JobState,
    StorageLocation,
};
use crate::notify::{Notification, NotificationSink};
use crate::storage::{ArtifactFilter, Inserted, Storage};

use super::guard::{ExecutionGuard, ExecutionSlot, TokenRegistry};
use super::package::{package, ArtifactDirs, Packaged};

const EVENT_CAPACITY: usize = 256;
const FINISHED_JOB_RETENTION_DAYS: i64 = 7;

/// Parameters of one `create_backup` call
#[derive(Debug, Clone)]
pub struct CreateBackupRequest {
    pub kind: BackupKind,
    pub location: StorageLocation,
    pub is_encrypted: bool,
    /// Defaults to the configured compression
    pub compression: Option<CompressionLevel>,
    /// Defaults to the configured retention
    pub retention_days: Option<u32>,
    pub base_artifact_id: Option<ArtifactId>,
    pub idempotency_key: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub actor: String,
}

impl CreateBackupRequest {
    pub fn new(kind: BackupKind, actor: impl Into<String>) -> Self {
        Self {
            kind,
            location: StorageLocation::Local,
            is_encrypted: false,
            compression: None,
            retention_days: None,
            base_artifact_id: None,
            idempotency_key: None,
            name: None,
            description: None,
            actor: actor.into(),
        }
    }

    pub fn full(actor: impl Into<String>) -> Self {
        Self::new(BackupKind::Full, actor)
    }

    pub fn incremental(actor: impl Into<String>) -> Self {
        Self::new(BackupKind::Incremental, actor)
    }

    pub fn with_base(mut self, base: ArtifactId) -> Self {
        self.base_artifact_id = Some(base);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn encrypted(mut self, is_encrypted: bool) -> Self {
        self.is_encrypted = is_encrypted;
        self
    }
}

/// Status change of an artifact, broadcast to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactEvent {
    pub artifact_id: ArtifactId,
    pub status: ArtifactStatus,
    pub error_message: Option<String>,
}

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub worker_pool_size: usize,
    pub timeout: Duration,
    pub default_compression: CompressionLevel,
    pub default_retention_days: u32,
    pub dirs: ArtifactDirs,
}

/// Outcome of a retention pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    pub expired: Vec<ArtifactId>,
    /// Expired by age but still the base of a live incremental
    pub kept_as_base: Vec<ArtifactId>,
    pub restore_points_expired: usize,
    pub jobs_pruned: usize,
}

/// Outcome of startup recovery
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub redispatched: Vec<ArtifactId>,
    pub interrupted: Vec<ArtifactId>,
}

pub struct BackupOrchestrator {
    storage: Arc<Storage>,
    audit: Arc<AuditLogger>,
    detector: Arc<ChangeDetector>,
    notifier: Arc<dyn NotificationSink>,
    key: Option<Arc<DerivedKey>>,
    config: OrchestratorConfig,
    workers: Arc<Semaphore>,
    tokens: TokenRegistry,
    events: broadcast::Sender<ArtifactEvent>,
}

impl BackupOrchestrator {
    pub fn new(
        storage: Arc<Storage>,
        audit: Arc<AuditLogger>,
        detector: Arc<ChangeDetector>,
        notifier: Arc<dyn NotificationSink>,
        key: Option<Arc<DerivedKey>>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            workers: Arc::new(Semaphore::new(config.worker_pool_size.max(1))),
            storage,
            audit,
            detector,
            notifier,
            key,
            config,
            tokens: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn detector(&self) -> &Arc<ChangeDetector> {
        &self.detector
    }

    pub fn key(&self) -> Option<&DerivedKey> {
        self.key.as_deref()
    }

    pub(crate) fn key_handle(&self) -> Option<Arc<DerivedKey>> {
        self.key.clone()
    }

    /// Receive status changes of every artifact from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ArtifactEvent> {
        self.events.subscribe()
    }

    /// Record a Pending artifact, enqueue its job and dispatch it
    ///
    /// Returns immediately. A repeated idempotency key returns the artifact
    /// created by the first call without dispatching anything.
    pub async fn create_backup(
        self: &Arc<Self>,
        request: CreateBackupRequest,
    ) -> VaultResult<BackupArtifact> {
        let artifact = self.prepare(request)?;
        let actor = artifact.created_by.clone();

        let artifact = match self.storage.artifacts.insert_idempotent(artifact)? {
            Inserted::Created(artifact) => artifact,
            Inserted::Existing(existing) => {
                debug!(artifact_id = %existing.id, "idempotency key matched an existing artifact");
                return Ok(existing);
            }
        };

        let job = match self.storage.jobs.enqueue(artifact.id) {
            Ok(job) => job,
            Err(e) => {
                // not durable, so not accepted
                self.storage.artifacts.delete(artifact.id)?;
                return Err(e);
            }
        };

        self.audit.record(
            AuditEntry::info(
                SubjectType::Artifact,
                artifact.id.full(),
                AuditAction::BackupRequested,
                format!("{} backup '{}' requested", artifact.kind, artifact.name),
                actor,
            )
            .with_details(&serde_json::json!({
                "kind": artifact.kind,
                "base_artifact_id": artifact.base_artifact_id,
                "encrypted": artifact.is_encrypted,
            })),
        );
        info!(artifact_id = %artifact.id, kind = %artifact.kind, "backup accepted");

        self.dispatch(job);
        Ok(artifact)
    }

    /// Create a backup and wait for it to reach a terminal status
    pub async fn create_backup_and_wait(
        self: &Arc<Self>,
        request: CreateBackupRequest,
    ) -> VaultResult<BackupArtifact> {
        let artifact = self.create_backup(request).await?;
        self.wait_for(artifact.id).await
    }

    /// Wait until `id` is Completed or Failed
    pub async fn wait_for(&self, id: ArtifactId) -> VaultResult<BackupArtifact> {
        let mut events = self.subscribe();
        // read after subscribing so a transition in between is not missed
        let current = self.storage.artifacts.require(id)?;
        if current.status.is_terminal() {
            return Ok(current);
        }

        loop {
            match events.recv().await {
                Ok(event) if event.artifact_id == id && event.status.is_terminal() => {
                    return self.storage.artifacts.require(id);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    let current = self.storage.artifacts.require(id)?;
                    if current.status.is_terminal() {
                        return Ok(current);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(VaultError::State("Backup event stream closed".into()));
                }
            }
        }
    }

    fn prepare(&self, request: CreateBackupRequest) -> VaultResult<BackupArtifact> {
        if request.is_encrypted && self.key.is_none() {
            return Err(VaultError::Validation(
                "Encrypted backup requested but no encryption key is configured".into(),
            ));
        }

        let mut kind = request.kind;
        let mut base_artifact_id = None;
        if kind == BackupKind::Incremental {
            let base = match request.base_artifact_id {
                Some(id) => Some(self.storage.artifacts.require(id)?),
                None => self.storage.artifacts.latest_completed()?,
            };
            match base {
                Some(base) => {
                    if !base.is_completed() {
                        return Err(VaultError::State(format!(
                            "Base artifact {} is {}, not COMPLETED",
                            base.id, base.status
                        )));
                    }
                    self.storage.artifacts.resolve_chain(base.id)?;
                    base_artifact_id = Some(base.id);
                }
                None => {
                    info!("no completed artifact to build on, promoting incremental to full");
                    kind = BackupKind::Full;
                }
            }
        } else if request.base_artifact_id.is_some() {
            return Err(VaultError::Validation(
                "Full backups do not take a base artifact".into(),
            ));
        }

        let mut artifact = BackupArtifact::new(kind, request.location, request.actor);
        if let Some(name) = request.name {
            artifact.name = name.trim().to_string();
        }
        artifact.description = request.description.unwrap_or_default();
        artifact.is_encrypted = request.is_encrypted;
        artifact.compression = request
            .compression
            .unwrap_or(self.config.default_compression);
        artifact.retention_days = request
            .retention_days
            .unwrap_or(self.config.default_retention_days);
        artifact.base_artifact_id = base_artifact_id;
        artifact.idempotency_key = request.idempotency_key;

        artifact
            .validate()
            .map_err(|e| VaultError::Validation(e.to_string()))?;
        Ok(artifact)
    }

    fn register_token(&self, id: ArtifactId) -> CancellationToken {
        match self.tokens.lock() {
            Ok(mut tokens) => tokens.entry(id).or_default().clone(),
            Err(_) => CancellationToken::new(),
        }
    }

    fn dispatch(self: &Arc<Self>, job: JobRecord) {
        self.register_token(job.artifact_id);
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run_job(job).await });
    }

    async fn run_job(self: Arc<Self>, job: JobRecord) {
        let artifact_id = job.artifact_id;
        let permit = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%artifact_id, "worker pool closed, job left queued");
                return;
            }
        };
        let token = self.register_token(artifact_id);
        let _slot = ExecutionSlot::new(artifact_id, Arc::clone(&self.tokens), permit);

        if let Err(e) = self.storage.jobs.claim(job.id) {
            warn!(%artifact_id, error = %e, "job already claimed");
            return;
        }

        let started = self.storage.artifacts.transition(
            artifact_id,
            ArtifactStatus::Pending,
            ArtifactStatus::InProgress,
            |a| a.started_at = Some(Utc::now()),
        );
        let artifact = match started {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(%artifact_id, error = %e, "second execution attempt rejected");
                self.finish_job(&job);
                return;
            }
        };
        self.publish(&artifact);
        self.audit.record(AuditEntry::info(
            SubjectType::Artifact,
            artifact.id.full(),
            AuditAction::BackupStarted,
            format!("Backup '{}' started", artifact.name),
            "system",
        ));

        let guard = ExecutionGuard::new("Backup", token, self.config.timeout);
        let outcome = {
            let detector = Arc::clone(&self.detector);
            let key = self.key.clone().filter(|_| artifact.is_encrypted);
            let dirs = self.config.dirs.clone();
            let artifact = artifact.clone();
            tokio::task::spawn_blocking(move || {
                package(&detector, &artifact, key.as_deref(), &dirs, &guard)
            })
            .await
            .unwrap_or_else(|e| Err(VaultError::Io(format!("Backup worker panicked: {}", e))))
        };

        self.complete(artifact, outcome);
        self.finish_job(&job);
    }

    fn complete(&self, artifact: BackupArtifact, outcome: VaultResult<Packaged>) {
        let now = Utc::now();
        match outcome {
            Ok(packaged) => {
                let recorded = self.storage.artifacts.transition(
                    artifact.id,
                    ArtifactStatus::InProgress,
                    ArtifactStatus::Completed,
                    |a| {
                        a.file_path = Some(packaged.file_path.clone());
                        a.size_bytes = packaged.size_bytes;
                        a.completed_at = Some(now);
                    },
                );
                match recorded {
                    Ok(done) => {
                        info!(artifact_id = %done.id, size_bytes = done.size_bytes, "backup completed");
                        self.audit.record(
                            AuditEntry::success(
                                SubjectType::Artifact,
                                done.id.full(),
                                AuditAction::BackupCompleted,
                                format!("Backup '{}' completed", done.name),
                                "system",
                            )
                            .with_details(&serde_json::json!({
                                "size_bytes": done.size_bytes,
                                "files_carried": packaged.files_carried,
                                "files_inherited": packaged.files_inherited,
                                "tables_exported": packaged.tables_exported,
                            })),
                        );
                        self.notifier.notify(&Notification::BackupCompleted {
                            artifact_id: done.id,
                            name: done.name.clone(),
                            size_bytes: done.size_bytes,
                            timestamp: now,
                        });
                        self.publish(&done);
                    }
                    Err(e) => {
                        error!(artifact_id = %artifact.id, error = %e, "failed to record completion");
                        if let Err(e) = std::fs::remove_file(&packaged.file_path) {
                            warn!(error = %e, "failed to remove unrecorded artifact file");
                        }
                        self.fail(&artifact, e.to_string());
                    }
                }
            }
            Err(e) => self.fail(&artifact, e.to_string()),
        }
    }

    fn fail(&self, artifact: &BackupArtifact, message: String) {
        warn!(artifact_id = %artifact.id, error = %message, "backup failed");
        let failed = self.storage.artifacts.transition(
            artifact.id,
            ArtifactStatus::InProgress,
            ArtifactStatus::Failed,
            |a| {
                a.error_message = Some(message.clone());
                a.completed_at = Some(Utc::now());
            },
        );
        let failed = match failed {
            Ok(failed) => failed,
            Err(e) => {
                error!(artifact_id = %artifact.id, error = %e, "failed to record failure");
                return;
            }
        };

        self.audit.record(AuditEntry::failure(
            SubjectType::Artifact,
            failed.id.full(),
            AuditAction::BackupFailed,
            format!("Backup '{}' failed: {}", failed.name, message),
            "system",
        ));
        self.notifier.notify(&Notification::BackupFailed {
            artifact_id: failed.id,
            name: failed.name.clone(),
            error: message,
            timestamp: Utc::now(),
        });
        self.publish(&failed);
    }

    fn finish_job(&self, job: &JobRecord) {
        if let Err(e) = self.storage.jobs.finish(job.id) {
            warn!(job_id = %job.id, error = %e, "failed to finish job");
        }
    }

    fn publish(&self, artifact: &BackupArtifact) {
        // no subscribers is fine
        let _ = self.events.send(ArtifactEvent {
            artifact_id: artifact.id,
            status: artifact.status,
            error_message: artifact.error_message.clone(),
        });
    }

    /// Ask a Pending or InProgress backup to stop at its next checkpoint
    pub fn cancel_backup(&self, id: ArtifactId, actor: &str) -> VaultResult<BackupArtifact> {
        let artifact = self.storage.artifacts.require(id)?;
        if artifact.status.is_terminal() {
            return Err(VaultError::State(format!(
                "Artifact {} is already {}",
                artifact.id, artifact.status
            )));
        }

        self.register_token(id).cancel();
        self.audit.record(AuditEntry::info(
            SubjectType::Artifact,
            id.full(),
            AuditAction::BackupCancelRequested,
            format!("Cancellation of '{}' requested", artifact.name),
            actor,
        ));
        info!(artifact_id = %id, "backup cancellation requested");
        Ok(artifact)
    }

    pub fn get_artifact(&self, id: ArtifactId) -> VaultResult<BackupArtifact> {
        self.storage.artifacts.require(id)
    }

    pub fn find_artifact(&self, query: &str) -> VaultResult<BackupArtifact> {
        self.storage.artifacts.find(query)
    }

    pub fn list_artifacts(&self, filter: &ArtifactFilter) -> VaultResult<Vec<BackupArtifact>> {
        self.storage.artifacts.query(filter)
    }

    /// The artifact and its bases, newest first, ending at a Full artifact
    pub fn resolve_chain(&self, id: ArtifactId) -> VaultResult<Vec<BackupArtifact>> {
        self.storage.artifacts.resolve_chain(id)
    }

    /// Delete terminal artifacts past their retention
    ///
    /// An expired artifact that is still the base of a live chain member is
    /// kept until its dependents expire too.
    pub fn enforce_retention(
        &self,
        now: DateTime<Utc>,
        actor: &str,
    ) -> VaultResult<RetentionReport> {
        let all = self.storage.artifacts.get_all()?;
        let mut expiring: HashSet<ArtifactId> = all
            .iter()
            .filter(|a| a.is_expired(now))
            .map(|a| a.id)
            .collect();

        let mut report = RetentionReport::default();
        loop {
            let protected: Vec<ArtifactId> = all
                .iter()
                .filter(|a| !expiring.contains(&a.id) && a.status != ArtifactStatus::Failed)
                .filter_map(|a| a.base_artifact_id)
                .filter(|base| expiring.contains(base))
                .collect();
            if protected.is_empty() {
                break;
            }
            for id in protected {
                expiring.remove(&id);
                report.kept_as_base.push(id);
            }
        }

        for artifact in all.iter().filter(|a| expiring.contains(&a.id)) {
            if let Some(path) = &artifact.file_path {
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(artifact_id = %artifact.id, error = %e, "failed to delete artifact file");
                        continue;
                    }
                }
            }
            report.restore_points_expired +=
                self.storage.restore_points.expire_for_artifact(artifact.id)?;
            self.storage.artifacts.delete(artifact.id)?;
            self.audit.record(AuditEntry::info(
                SubjectType::Artifact,
                artifact.id.full(),
                AuditAction::ArtifactExpired,
                format!(
                    "Artifact '{}' removed after {} days",
                    artifact.name, artifact.retention_days
                ),
                actor,
            ));
            report.expired.push(artifact.id);
        }

        report.jobs_pruned = self
            .storage
            .jobs
            .prune_finished(now - chrono::Duration::days(FINISHED_JOB_RETENTION_DAYS))?;

        if !report.expired.is_empty() {
            info!(
                expired = report.expired.len(),
                kept_as_base = report.kept_as_base.len(),
                "retention enforced"
            );
        }
        Ok(report)
    }

    /// Resume the durable queue after a restart
    ///
    /// Claimed jobs belong to executions cut off mid-run: their artifacts are
    /// failed and any partial files removed. Queued jobs are dispatched again.
    pub fn recover(self: &Arc<Self>) -> VaultResult<RecoveryReport> {
        let mut report = RecoveryReport::default();
        clear_partials(&self.config.dirs.temp_dir);

        for job in self.storage.jobs.in_state(JobState::Claimed)? {
            let id = job.artifact_id;
            if let Some(artifact) = self.storage.artifacts.get(id)? {
                if artifact.status == ArtifactStatus::Pending {
                    self.storage.artifacts.transition(
                        id,
                        ArtifactStatus::Pending,
                        ArtifactStatus::InProgress,
                        |a| a.started_at = Some(Utc::now()),
                    )?;
                }
                if !artifact.status.is_terminal() {
                    self.fail(&artifact, "Interrupted by a restart before completing".into());
                }
            }
            self.finish_job(&job);
            self.audit.record(AuditEntry::failure(
                SubjectType::Artifact,
                id.full(),
                AuditAction::JobRecovered,
                "Execution interrupted by a restart",
                "system",
            ));
            report.interrupted.push(id);
        }

        for job in self.storage.jobs.in_state(JobState::Queued)? {
            let id = job.artifact_id;
            match self.storage.artifacts.get(id)? {
                Some(artifact) if artifact.status == ArtifactStatus::Pending => {
                    self.audit.record(AuditEntry::info(
                        SubjectType::Artifact,
                        id.full(),
                        AuditAction::JobRecovered,
                        "Queued backup dispatched after restart",
                        "system",
                    ));
                    self.dispatch(job);
                    report.redispatched.push(id);
                }
                _ => {
                    // artifact gone or already settled; retire the job
                    if self.storage.jobs.claim(job.id).is_ok() {
                        self.finish_job(&job);
                    }
                }
            }
        }

        if !report.redispatched.is_empty() || !report.interrupted.is_empty() {
            info!(
                redispatched = report.redispatched.len(),
                interrupted = report.interrupted.len(),
                "backup queue recovered"
            );
        }
        Ok(report)
    }
}

fn clear_partials(temp_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(temp_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "partial") {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove stale partial file");
            }
        }
    }
}
