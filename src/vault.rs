//! Wiring of the stores and engines behind one handle
//!
//! The CLI and the daemon open a `Vault` once; every engine shares the same
//! `Storage`, `AuditLogger` and encryption key.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::audit::{AuditAction, AuditEntry, AuditLogger, SubjectType};
use crate::backup::{ArtifactDirs, BackupOrchestrator, OrchestratorConfig, RecoveryReport};
use crate::config::{Settings, VaultPaths};
use crate::crypto::{derive_key, DerivedKey, SecureString};
use crate::dataset::{DatasetStore, JsonDatasetStore};
use crate::detect::ChangeDetector;
use crate::error::{VaultError, VaultResult};
use crate::notify::{NotificationSink, TracingNotifier};
use crate::restore::RestoreEngine;
use crate::schedule::ScheduleEngine;
use crate::storage::Storage;

pub struct Vault {
    paths: VaultPaths,
    settings: Settings,
    storage: Arc<Storage>,
    audit: Arc<AuditLogger>,
    orchestrator: Arc<BackupOrchestrator>,
    restore: Arc<RestoreEngine>,
    scheduler: Arc<ScheduleEngine>,
}

impl Vault {
    /// Open with notifications forwarded to the tracing log
    pub fn open(
        paths: VaultPaths,
        settings: Settings,
        key: Option<DerivedKey>,
    ) -> VaultResult<Self> {
        Self::open_with(paths, settings, key, Arc::new(TracingNotifier))
    }

    pub fn open_with(
        paths: VaultPaths,
        settings: Settings,
        key: Option<DerivedKey>,
        notifier: Arc<dyn NotificationSink>,
    ) -> VaultResult<Self> {
        settings.validate()?;
        let storage = Arc::new(Storage::open(paths.clone())?);
        let audit = Arc::new(AuditLogger::new(paths.audit_log()));

        let dataset: Arc<dyn DatasetStore> = Arc::new(JsonDatasetStore::new(
            settings.tables_dir(&paths),
            settings.dataset.tables.clone(),
            settings.dataset.watermark_column.clone(),
        ));
        let detector = Arc::new(ChangeDetector::new(
            Arc::clone(&storage.artifacts),
            settings.tracked_roots.clone(),
            dataset,
        ));

        let orchestrator = Arc::new(BackupOrchestrator::new(
            Arc::clone(&storage),
            Arc::clone(&audit),
            detector,
            Arc::clone(&notifier),
            key.map(Arc::new),
            OrchestratorConfig {
                worker_pool_size: settings.backup.worker_pool_size,
                timeout: settings.backup.timeout(),
                default_compression: settings.backup.default_compression,
                default_retention_days: settings.backup.default_retention_days,
                dirs: ArtifactDirs {
                    artifacts_dir: paths.artifacts_dir(),
                    temp_dir: paths.temp_dir(),
                },
            },
        ));
        let restore = Arc::new(RestoreEngine::new(
            Arc::clone(&storage),
            Arc::clone(&audit),
            Arc::clone(&orchestrator),
            notifier,
            settings.restore.clone(),
        ));
        let scheduler = Arc::new(ScheduleEngine::new(
            Arc::clone(&storage),
            Arc::clone(&audit),
            Arc::clone(&orchestrator),
            settings.scheduler.clone(),
        ));

        debug!(base_dir = %paths.base_dir().display(), "vault opened");
        Ok(Self {
            paths,
            settings,
            storage,
            audit,
            orchestrator,
            restore,
            scheduler,
        })
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn backups(&self) -> &Arc<BackupOrchestrator> {
        &self.orchestrator
    }

    pub fn restores(&self) -> &Arc<RestoreEngine> {
        &self.restore
    }

    pub fn schedules(&self) -> &Arc<ScheduleEngine> {
        &self.scheduler
    }

    /// Resume work a previous process left behind
    ///
    /// Must run inside a tokio runtime, since queued jobs are re-dispatched.
    pub fn recover(&self) -> VaultResult<RecoveryReport> {
        let report = self.orchestrator.recover()?;
        if !report.redispatched.is_empty() || !report.interrupted.is_empty() {
            info!(
                redispatched = report.redispatched.len(),
                interrupted = report.interrupted.len(),
                "recovered unfinished backups"
            );
        }
        Ok(report)
    }

    /// Drop audit entries older than the configured retention
    pub fn sweep_audit(&self, now: DateTime<Utc>, actor: &str) -> VaultResult<usize> {
        let cutoff = now - Duration::days(i64::from(self.settings.audit_retention_days));
        let removed = self.audit.sweep(cutoff)?;
        if removed > 0 {
            self.audit.record(
                AuditEntry::info(
                    SubjectType::System,
                    "audit",
                    AuditAction::AuditSwept,
                    format!("Removed {} audit entries older than {}", removed, cutoff.date_naive()),
                    actor,
                )
                .with_details(&serde_json::json!({ "removed": removed })),
            );
            info!(removed, "audit log swept");
        }
        Ok(removed)
    }
}

/// Derive the vault key and check it against the stored fingerprint
pub fn unlock(settings: &Settings, passphrase: &SecureString) -> VaultResult<DerivedKey> {
    let params = settings
        .encryption
        .key_params
        .as_ref()
        .ok_or_else(|| VaultError::Encryption("No key parameters found".into()))?;
    let key = derive_key(passphrase.as_str(), params)?;
    match settings.encryption.key_fingerprint.as_deref() {
        Some(expected) if expected != key.fingerprint() => {
            Err(VaultError::Encryption("Invalid passphrase".into()))
        }
        _ => Ok(key),
    }
}
