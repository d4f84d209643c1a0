//! Schedule management and the ticker
//!
//! Every run, whether fired by the ticker or by an operator, goes through
//! `trigger`: a log entry is appended as Scheduled, the backup is requested,
//! and the entry moves to Running with the artifact id. Runs settle to
//! Completed or Failed when the artifact reaches a terminal status, either
//! through the event listener or through reconciliation on the next tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::{AuditAction, AuditEntry, AuditLogger, SubjectType};
use crate::backup::{ArtifactEvent, BackupOrchestrator, CreateBackupRequest};
use crate::config::settings::SchedulerSettings;
use crate::error::{VaultError, VaultResult};
use crate::models::{
    ArtifactStatus, Schedule, ScheduleConfig, ScheduleId, ScheduleLogEntry, ScheduleRunStatus,
};
use crate::storage::Storage;

use super::recurrence::next_run;

const MAX_NAME_LEN: usize = 100;

/// Aggregate counters across every schedule
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleStats {
    pub total_schedules: usize,
    pub active_schedules: usize,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub next_scheduled_run: Option<DateTime<Utc>>,
}

impl ScheduleStats {
    /// Share of settled runs that completed, as a percentage
    pub fn success_rate(&self) -> Option<f64> {
        let settled = self.successful_runs + self.failed_runs;
        (settled > 0).then(|| self.successful_runs as f64 * 100.0 / settled as f64)
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub triggered: Vec<ScheduleId>,
    /// Due but still running a previous execution
    pub skipped_running: Vec<ScheduleId>,
    /// Running entries settled from artifact status
    pub reconciled: usize,
}

pub struct ScheduleEngine {
    storage: Arc<Storage>,
    audit: Arc<AuditLogger>,
    orchestrator: Arc<BackupOrchestrator>,
    settings: SchedulerSettings,
    tick_lock: Mutex<()>,
}

impl ScheduleEngine {
    pub fn new(
        storage: Arc<Storage>,
        audit: Arc<AuditLogger>,
        orchestrator: Arc<BackupOrchestrator>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            storage,
            audit,
            orchestrator,
            settings,
            tick_lock: Mutex::new(()),
        }
    }

    fn first_run(&self, schedule: &Schedule, now: DateTime<Utc>) -> VaultResult<DateTime<Utc>> {
        next_run(&schedule.recurrence, None, now, self.settings.custom_unit()).ok_or_else(|| {
            VaultError::Validation(format!(
                "Schedule '{}' has no future occurrence",
                schedule.name
            ))
        })
    }

    fn validate_config(
        &self,
        config: &ScheduleConfig,
        existing: Option<ScheduleId>,
    ) -> VaultResult<()> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation("Schedule name cannot be empty".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(VaultError::Validation(format!(
                "Schedule name too long ({} chars, max {})",
                name.len(),
                MAX_NAME_LEN
            )));
        }
        config
            .recurrence
            .validate()
            .map_err(VaultError::Validation)?;
        if config.retention_days == 0 {
            return Err(VaultError::Validation(
                "Retention must be at least one day".into(),
            ));
        }
        if config.is_encrypted && self.orchestrator.key().is_none() {
            return Err(VaultError::Validation(
                "Encrypted schedule requested but no encryption key is configured".into(),
            ));
        }
        if self.storage.schedules.name_exists(name, existing)? {
            return Err(VaultError::Conflict(format!(
                "A schedule named '{}' already exists",
                name
            )));
        }
        Ok(())
    }

    /// Create an active schedule with its first run computed from now
    pub fn create_schedule(&self, mut config: ScheduleConfig, actor: &str) -> VaultResult<Schedule> {
        self.validate_config(&config, None)?;
        config.name = config.name.trim().to_string();

        let mut schedule = Schedule::from_config(config, actor);
        schedule.next_run = Some(self.first_run(&schedule, Utc::now())?);
        self.storage.schedules.upsert(schedule.clone())?;

        self.audit.record(
            AuditEntry::success(
                SubjectType::Schedule,
                schedule.id.full(),
                AuditAction::ScheduleCreated,
                format!("Schedule '{}' created", schedule.name),
                actor,
            )
            .with_details(&schedule.recurrence),
        );
        info!(schedule_id = %schedule.id, next_run = ?schedule.next_run, "schedule created");
        Ok(schedule)
    }

    /// Replace a schedule's configuration; an active schedule is re-timed
    pub fn update_schedule(
        &self,
        id: ScheduleId,
        mut config: ScheduleConfig,
        actor: &str,
    ) -> VaultResult<Schedule> {
        self.validate_config(&config, Some(id))?;
        config.name = config.name.trim().to_string();

        let existing = self.storage.schedules.require(id)?;
        let next = next_run(
            &config.recurrence,
            existing.last_run,
            Utc::now(),
            self.settings.custom_unit(),
        )
        .ok_or_else(|| {
            VaultError::Validation(format!(
                "Schedule '{}' has no future occurrence",
                config.name
            ))
        })?;
        let updated = self.storage.schedules.update(id, |schedule| {
            schedule.apply_config(config);
            if schedule.is_active {
                schedule.next_run = Some(next);
            }
            Ok(())
        })?;

        self.audit.record(AuditEntry::success(
            SubjectType::Schedule,
            updated.id.full(),
            AuditAction::ScheduleUpdated,
            format!("Schedule '{}' updated", updated.name),
            actor,
        ));
        Ok(updated)
    }

    /// Remove a schedule; its run history stays in the log
    pub fn delete_schedule(&self, id: ScheduleId, actor: &str) -> VaultResult<Schedule> {
        let schedule = self.storage.schedules.require(id)?;
        self.storage.schedules.delete(id)?;
        self.audit.record(AuditEntry::success(
            SubjectType::Schedule,
            id.full(),
            AuditAction::ScheduleDeleted,
            format!("Schedule '{}' deleted", schedule.name),
            actor,
        ));
        info!(schedule_id = %id, "schedule deleted");
        Ok(schedule)
    }

    pub fn get_schedule(&self, id: ScheduleId) -> VaultResult<Schedule> {
        self.storage.schedules.require(id)
    }

    /// Look a schedule up by name or id prefix
    pub fn find_schedule(&self, query: &str) -> VaultResult<Schedule> {
        self.storage.schedules.find(query)
    }

    pub fn list_schedules(&self) -> VaultResult<Vec<Schedule>> {
        self.storage.schedules.get_all()
    }

    /// Runs of one schedule, newest first
    pub fn logs_for(&self, id: ScheduleId) -> VaultResult<Vec<ScheduleLogEntry>> {
        self.storage.schedule_log.for_schedule(id)
    }

    /// Flip a schedule between active and inactive
    ///
    /// Reactivation computes the next run from the reactivation instant, so
    /// occurrences missed while inactive are never replayed.
    pub fn toggle_status(&self, id: ScheduleId, actor: &str) -> VaultResult<Schedule> {
        let now = Utc::now();
        let existing = self.storage.schedules.require(id)?;
        let resumed_at = next_run(&existing.recurrence, None, now, self.settings.custom_unit());
        let toggled = self.storage.schedules.update(id, |schedule| {
            schedule.is_active = !schedule.is_active;
            schedule.next_run = if schedule.is_active { resumed_at } else { None };
            schedule.updated_at = now;
            Ok(())
        })?;

        let state = if toggled.is_active { "activated" } else { "deactivated" };
        self.audit.record(AuditEntry::success(
            SubjectType::Schedule,
            toggled.id.full(),
            AuditAction::ScheduleToggled,
            format!("Schedule '{}' {}", toggled.name, state),
            actor,
        ));
        info!(schedule_id = %id, active = toggled.is_active, "schedule toggled");
        Ok(toggled)
    }

    /// Run a schedule now, regardless of its next run time
    pub async fn execute_schedule(
        &self,
        id: ScheduleId,
        actor: &str,
    ) -> VaultResult<ScheduleLogEntry> {
        let schedule = self.storage.schedules.require(id)?;
        if self.storage.schedule_log.running_for(id)?.is_some() {
            return Err(VaultError::Conflict(format!(
                "Schedule '{}' is already running",
                schedule.name
            )));
        }
        self.trigger(&schedule, Utc::now(), true, actor).await
    }

    /// Settle finished runs, then fire every due schedule
    ///
    /// Ticks are serialized; a schedule that is still running when due is
    /// skipped and fires at its following occurrence.
    pub async fn tick(&self, now: DateTime<Utc>) -> VaultResult<TickReport> {
        let _tick = self.tick_lock.lock().await;
        let mut report = TickReport {
            reconciled: self.reconcile()?,
            ..TickReport::default()
        };

        for schedule in self.storage.schedules.get_all()? {
            if !schedule.is_due(now) {
                continue;
            }
            if self.storage.schedule_log.running_for(schedule.id)?.is_some() {
                debug!(schedule_id = %schedule.id, "due schedule still running, skipping");
                let next = next_run(
                    &schedule.recurrence,
                    schedule.last_run,
                    now,
                    self.settings.custom_unit(),
                );
                self.storage.schedules.update(schedule.id, |s| {
                    s.next_run = next;
                    Ok(())
                })?;
                report.skipped_running.push(schedule.id);
                continue;
            }
            match self.trigger(&schedule, now, false, "scheduler").await {
                Ok(_) => report.triggered.push(schedule.id),
                Err(e) => warn!(schedule_id = %schedule.id, error = %e, "schedule trigger failed"),
            }
        }
        Ok(report)
    }

    async fn trigger(
        &self,
        schedule: &Schedule,
        now: DateTime<Utc>,
        manual: bool,
        actor: &str,
    ) -> VaultResult<ScheduleLogEntry> {
        let entry = ScheduleLogEntry::scheduled(schedule.id, now, manual);
        self.storage.schedule_log.append(entry.clone())?;

        let mut request = CreateBackupRequest::new(schedule.backup_kind, actor)
            .encrypted(schedule.is_encrypted)
            .with_name(format!("{}-{}", schedule.name, now.format("%Y%m%d-%H%M%S")))
            .with_idempotency_key(format!("schedule:{}:{}", schedule.id.full(), entry.id.full()));
        request.location = schedule.location.clone();
        request.compression = Some(schedule.compression);
        request.retention_days = Some(schedule.retention_days);

        let (entry, failed) = match self.orchestrator.create_backup(request).await {
            Ok(artifact) => {
                let running = self.storage.schedule_log.transition(
                    entry.id,
                    ScheduleRunStatus::Running,
                    |e| {
                        e.artifact_id = Some(artifact.id);
                        e.started_at = Some(Utc::now());
                    },
                )?;
                (running, false)
            }
            Err(e) => {
                warn!(schedule_id = %schedule.id, error = %e, "scheduled backup was not accepted");
                let failed = self.storage.schedule_log.transition(
                    entry.id,
                    ScheduleRunStatus::Failed,
                    |entry| {
                        entry.error_message = Some(e.to_string());
                        entry.completed_at = Some(Utc::now());
                    },
                )?;
                (failed, true)
            }
        };

        let next = next_run(&schedule.recurrence, Some(now), now, self.settings.custom_unit());
        if next.is_none() && schedule.is_active {
            warn!(schedule_id = %schedule.id, "schedule has no further occurrence");
        }
        self.storage.schedules.update(schedule.id, |s| {
            s.last_run = Some(now);
            s.total_runs += 1;
            if failed {
                s.failed_runs += 1;
            }
            if s.is_active {
                s.next_run = next;
            }
            Ok(())
        })?;

        let message = if manual {
            format!("Schedule '{}' run manually", schedule.name)
        } else {
            format!("Schedule '{}' fired", schedule.name)
        };
        self.audit.record(
            AuditEntry::info(
                SubjectType::Schedule,
                schedule.id.full(),
                AuditAction::ScheduleTriggered,
                message,
                actor,
            )
            .with_details(&serde_json::json!({
                "run_id": entry.id.full(),
                "artifact_id": entry.artifact_id.map(|id| id.full()),
                "manual": manual,
            })),
        );
        info!(schedule_id = %schedule.id, run_id = %entry.id, manual, "schedule triggered");

        // the backup may already have finished before the entry was Running
        if let Some(artifact_id) = entry.artifact_id {
            if let Ok(artifact) = self.storage.artifacts.require(artifact_id) {
                if artifact.status.is_terminal() {
                    self.settle(&entry, artifact.status, artifact.error_message)?;
                    let runs = self.storage.schedule_log.for_schedule(schedule.id)?;
                    return Ok(runs.into_iter().find(|r| r.id == entry.id).unwrap_or(entry));
                }
            }
        }
        Ok(entry)
    }

    /// Move a Running entry to its terminal status and count it
    fn settle(
        &self,
        entry: &ScheduleLogEntry,
        status: ArtifactStatus,
        error_message: Option<String>,
    ) -> VaultResult<()> {
        let (to, succeeded) = match status {
            ArtifactStatus::Completed => (ScheduleRunStatus::Completed, true),
            ArtifactStatus::Failed => (ScheduleRunStatus::Failed, false),
            _ => return Ok(()),
        };
        let settled = self.storage.schedule_log.transition(entry.id, to, |e| {
            e.completed_at = Some(Utc::now());
            if !succeeded {
                e.error_message = error_message;
            }
        });
        match settled {
            Ok(_) => {}
            // another path settled it first
            Err(VaultError::State(_)) => return Ok(()),
            Err(e) => return Err(e),
        }

        let counted = self.storage.schedules.update(entry.schedule_id, |s| {
            if succeeded {
                s.successful_runs += 1;
            } else {
                s.failed_runs += 1;
            }
            Ok(())
        });
        match counted {
            Ok(_) | Err(VaultError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        debug!(run_id = %entry.id, status = %to, "schedule run settled");
        Ok(())
    }

    /// Settle every Running entry whose artifact has finished
    pub fn reconcile(&self) -> VaultResult<usize> {
        let mut settled = 0;
        for entry in self.storage.schedule_log.running()? {
            let Some(artifact_id) = entry.artifact_id else {
                continue;
            };
            let (status, error) = match self.storage.artifacts.get(artifact_id)? {
                Some(artifact) => (artifact.status, artifact.error_message),
                None => (
                    ArtifactStatus::Failed,
                    Some(format!("Artifact {} no longer exists", artifact_id)),
                ),
            };
            if status.is_terminal() {
                self.settle(&entry, status, error)?;
                settled += 1;
            }
        }
        Ok(settled)
    }

    fn on_artifact_event(&self, event: ArtifactEvent) -> VaultResult<()> {
        if !event.status.is_terminal() {
            return Ok(());
        }
        if let Some(entry) = self.storage.schedule_log.running_for_artifact(event.artifact_id)? {
            self.settle(&entry, event.status, event.error_message)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> VaultResult<ScheduleStats> {
        let schedules = self.storage.schedules.get_all()?;
        Ok(ScheduleStats {
            total_schedules: schedules.len(),
            active_schedules: schedules.iter().filter(|s| s.is_active).count(),
            total_runs: schedules.iter().map(|s| s.total_runs).sum(),
            successful_runs: schedules.iter().map(|s| s.successful_runs).sum(),
            failed_runs: schedules.iter().map(|s| s.failed_runs).sum(),
            next_scheduled_run: schedules
                .iter()
                .filter(|s| s.is_active)
                .filter_map(|s| s.next_run)
                .min(),
        })
    }

    /// Settle schedule runs as their artifacts finish, until `shutdown`
    pub fn spawn_listener(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut events = self.orchestrator.subscribe();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            if let Err(e) = engine.on_artifact_event(event) {
                                warn!(error = %e, "failed to settle schedule run");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            debug!(missed, "schedule listener lagged, reconciling");
                            if let Err(e) = engine.reconcile() {
                                warn!(error = %e, "schedule reconciliation failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("schedule listener stopped");
        })
    }

    /// Tick on the configured interval until `shutdown`
    pub fn spawn_ticker(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let period = self.settings.tick_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        match engine.tick(Utc::now()).await {
                            Ok(report) if !report.triggered.is_empty() => {
                                info!(triggered = report.triggered.len(), "scheduler tick");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "scheduler tick failed"),
                        }
                    }
                }
            }
            info!("scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{ArtifactDirs, OrchestratorConfig};
    use crate::config::{TrackedRoot, VaultPaths};
    use crate::dataset::{DatasetStore, JsonDatasetStore};
    use crate::detect::ChangeDetector;
    use crate::models::{ArtifactId, BackupKind, CompressionLevel, Recurrence, StorageLocation};
    use crate::notify::TracingNotifier;
    use chrono::{Duration, NaiveTime, Weekday};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        storage: Arc<Storage>,
        audit: Arc<AuditLogger>,
        orchestrator: Arc<BackupOrchestrator>,
        engine: Arc<ScheduleEngine>,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp.path().join("vault"));
        let storage = Arc::new(Storage::open(paths.clone()).unwrap());
        let root = temp.path().join("records");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("roster.csv"), "id,name\n1,Ada\n").unwrap();

        let dataset: Arc<dyn DatasetStore> =
            Arc::new(JsonDatasetStore::new(paths.tables_dir(), vec![], "updated_at"));
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
                timeout: std::time::Duration::from_secs(60),
                default_compression: CompressionLevel::Low,
                default_retention_days: 30,
                dirs: ArtifactDirs {
                    artifacts_dir: paths.artifacts_dir(),
                    temp_dir: paths.temp_dir(),
                },
            },
        ));
        let engine = Arc::new(ScheduleEngine::new(
            Arc::clone(&storage),
            Arc::clone(&audit),
            Arc::clone(&orchestrator),
            SchedulerSettings::default(),
        ));
        Fixture {
            _temp: temp,
            storage,
            audit,
            orchestrator,
            engine,
        }
    }

    fn nightly(name: &str) -> ScheduleConfig {
        ScheduleConfig {
            name: name.to_string(),
            recurrence: Recurrence::daily(NaiveTime::from_hms_opt(2, 0, 0).unwrap()),
            backup_kind: BackupKind::Full,
            location: StorageLocation::Local,
            is_encrypted: false,
            compression: CompressionLevel::Low,
            retention_days: 14,
        }
    }

    async fn wait_for_terminal(fx: &Fixture, artifact_id: ArtifactId) {
        tokio::time::timeout(
            std::time::Duration::from_secs(10),
            fx.orchestrator.wait_for(artifact_id),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_computes_first_run() {
        let fx = fixture();
        let before = Utc::now();
        let schedule = fx.engine.create_schedule(nightly("nightly"), "alice").unwrap();
        assert!(schedule.is_active);
        let next = schedule.next_run.unwrap();
        assert!(next > before);
        assert!(next <= before + Duration::days(1));
        assert_eq!(next.time(), NaiveTime::from_hms_opt(2, 0, 0).unwrap());

        let audit = fx.audit.for_subject(&schedule.id.full()).unwrap();
        assert_eq!(audit[0].action, AuditAction::ScheduleCreated);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_conflict() {
        let fx = fixture();
        fx.engine.create_schedule(nightly("nightly"), "alice").unwrap();
        let err = fx.engine.create_schedule(nightly("nightly"), "bob").unwrap_err();
        assert!(matches!(err, VaultError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_invalid_recurrence_rejected() {
        let fx = fixture();
        let mut config = nightly("weekly");
        config.recurrence = Recurrence::weekly(NaiveTime::from_hms_opt(9, 0, 0).unwrap(), vec![]);
        assert!(matches!(
            fx.engine.create_schedule(config, "alice"),
            Err(VaultError::Validation(_))
        ));

        let mut config = nightly("   ");
        config.recurrence = Recurrence::weekly(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            vec![Weekday::Mon],
        );
        assert!(matches!(
            fx.engine.create_schedule(config, "alice"),
            Err(VaultError::Validation(_))
        ));

        let mut config = nightly("encrypted");
        config.is_encrypted = true;
        assert!(matches!(
            fx.engine.create_schedule(config, "alice"),
            Err(VaultError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_interval_leaves_store_usable() {
        let fx = fixture();
        let mut config = nightly("forever");
        config.recurrence.interval = 100_000_000;
        assert!(matches!(
            fx.engine.create_schedule(config, "alice"),
            Err(VaultError::Validation(_))
        ));

        // a record written before the cap existed
        let mut legacy = fx.engine.create_schedule(nightly("legacy"), "alice").unwrap();
        legacy.recurrence.interval = 100_000_000;
        fx.storage.schedules.upsert(legacy.clone()).unwrap();

        fx.engine.execute_schedule(legacy.id, "alice").await.unwrap();
        let after = fx.engine.get_schedule(legacy.id).unwrap();
        assert_eq!(after.total_runs, 1);
        assert!(after.next_run.is_none());
        assert_eq!(fx.engine.list_schedules().unwrap().len(), 1);

        let toggled = fx.engine.toggle_status(legacy.id, "alice").unwrap();
        assert!(!toggled.is_active);
        let toggled = fx.engine.toggle_status(legacy.id, "alice").unwrap();
        assert!(toggled.is_active);
        assert!(toggled.next_run.is_none());
        fx.engine.tick(Utc::now() + Duration::days(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_keeps_counters_and_allows_own_name() {
        let fx = fixture();
        let schedule = fx.engine.create_schedule(nightly("nightly"), "alice").unwrap();
        let mut config = nightly("nightly");
        config.retention_days = 60;
        let updated = fx.engine.update_schedule(schedule.id, config, "alice").unwrap();
        assert_eq!(updated.id, schedule.id);
        assert_eq!(updated.retention_days, 60);

        fx.engine.create_schedule(nightly("other"), "alice").unwrap();
        let err = fx
            .engine
            .update_schedule(schedule.id, nightly("other"), "alice")
            .unwrap_err();
        assert!(matches!(err, VaultError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_tick_fires_due_schedule_and_settles() {
        let fx = fixture();
        let schedule = fx.engine.create_schedule(nightly("nightly"), "alice").unwrap();
        let due_at = schedule.next_run.unwrap() + Duration::seconds(1);

        // not yet due
        let early = fx.engine.tick(due_at - Duration::hours(2)).await.unwrap();
        assert!(early.triggered.is_empty());

        let report = fx.engine.tick(due_at).await.unwrap();
        assert_eq!(report.triggered, vec![schedule.id]);

        let after = fx.engine.get_schedule(schedule.id).unwrap();
        assert_eq!(after.total_runs, 1);
        assert_eq!(after.last_run, Some(due_at));
        assert!(after.next_run.unwrap() > due_at);

        let run = fx.engine.logs_for(schedule.id).unwrap().remove(0);
        assert!(!run.manual);
        let artifact_id = run.artifact_id.unwrap();
        wait_for_terminal(&fx, artifact_id).await;

        fx.engine.tick(due_at).await.unwrap();
        let run = fx.engine.logs_for(schedule.id).unwrap().remove(0);
        assert_eq!(run.status, ScheduleRunStatus::Completed);
        assert!(run.completed_at.is_some());
        assert_eq!(fx.engine.get_schedule(schedule.id).unwrap().successful_runs, 1);

        let artifact = fx.storage.artifacts.require(artifact_id).unwrap();
        assert_eq!(artifact.retention_days, 14);
        assert!(artifact.name.starts_with("nightly-"));
    }

    #[tokio::test]
    async fn test_listener_settles_manual_run() {
        let fx = fixture();
        let shutdown = CancellationToken::new();
        let listener = fx.engine.spawn_listener(shutdown.clone());

        let schedule = fx.engine.create_schedule(nightly("nightly"), "alice").unwrap();
        let run = fx.engine.execute_schedule(schedule.id, "alice").await.unwrap();
        assert!(run.manual);

        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                let current = fx.engine.logs_for(schedule.id).unwrap().remove(0);
                if current.status.is_terminal() {
                    assert_eq!(current.status, ScheduleRunStatus::Completed);
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        let after = fx.engine.get_schedule(schedule.id).unwrap();
        assert_eq!(after.total_runs, 1);
        assert_eq!(after.successful_runs, 1);

        shutdown.cancel();
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn test_running_schedule_is_not_started_twice() {
        let fx = fixture();
        let schedule = fx.engine.create_schedule(nightly("nightly"), "alice").unwrap();
        let mut running = ScheduleLogEntry::scheduled(schedule.id, Utc::now(), false);
        running.status = ScheduleRunStatus::Running;
        fx.storage.schedule_log.append(running).unwrap();

        let err = fx.engine.execute_schedule(schedule.id, "alice").await.unwrap_err();
        assert!(matches!(err, VaultError::Conflict(_)));

        let due_at = schedule.next_run.unwrap() + Duration::seconds(1);
        let report = fx.engine.tick(due_at).await.unwrap();
        assert!(report.triggered.is_empty());
        assert_eq!(report.skipped_running, vec![schedule.id]);
        assert!(fx.engine.get_schedule(schedule.id).unwrap().next_run.unwrap() > due_at);
        assert_eq!(fx.engine.logs_for(schedule.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_clears_and_recomputes_next_run() {
        let fx = fixture();
        let schedule = fx.engine.create_schedule(nightly("nightly"), "alice").unwrap();

        let off = fx.engine.toggle_status(schedule.id, "alice").unwrap();
        assert!(!off.is_active);
        assert!(off.next_run.is_none());
        let report = fx
            .engine
            .tick(Utc::now() + Duration::days(3))
            .await
            .unwrap();
        assert!(report.triggered.is_empty());

        let reenabled_at = Utc::now();
        let on = fx.engine.toggle_status(schedule.id, "alice").unwrap();
        assert!(on.is_active);
        assert!(on.next_run.unwrap() > reenabled_at);
    }

    #[tokio::test]
    async fn test_stats_aggregate_counters() {
        let fx = fixture();
        let first = fx.engine.create_schedule(nightly("a"), "alice").unwrap();
        let second = fx.engine.create_schedule(nightly("b"), "alice").unwrap();
        fx.engine.toggle_status(second.id, "alice").unwrap();
        fx.storage
            .schedules
            .update(first.id, |s| {
                s.total_runs = 4;
                s.successful_runs = 3;
                s.failed_runs = 1;
                Ok(())
            })
            .unwrap();

        let stats = fx.engine.stats().unwrap();
        assert_eq!(stats.total_schedules, 2);
        assert_eq!(stats.active_schedules, 1);
        assert_eq!(stats.total_runs, 4);
        assert_eq!(stats.success_rate(), Some(75.0));
        assert_eq!(stats.next_scheduled_run, first.next_run);
    }

    #[tokio::test]
    async fn test_delete_keeps_history() {
        let fx = fixture();
        let schedule = fx.engine.create_schedule(nightly("nightly"), "alice").unwrap();
        fx.engine.execute_schedule(schedule.id, "alice").await.unwrap();
        fx.engine.delete_schedule(schedule.id, "alice").unwrap();
        assert!(matches!(
            fx.engine.get_schedule(schedule.id),
            Err(VaultError::NotFound { .. })
        ));
        assert_eq!(fx.engine.logs_for(schedule.id).unwrap().len(), 1);
    }
}
