//! Audit entry data structures
//!
//! Defines the structure of audit log entries: what was acted on, what
//! happened, whether it worked and who asked for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actions recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    BackupRequested,
    BackupStarted,
    BackupCompleted,
    BackupFailed,
    BackupCancelRequested,
    ArtifactExpired,
    JobRecovered,
    RestorePreviewed,
    RestoreValidated,
    RestoreCompleted,
    RestoreFailed,
    RestorePointCreated,
    RestorePointExpired,
    Rollback,
    ScheduleCreated,
    ScheduleUpdated,
    ScheduleDeleted,
    ScheduleToggled,
    ScheduleTriggered,
    EncryptionEnabled,
    AuditSwept,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Same spelling as the serialized form
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_uppercase))
            .unwrap_or_default();
        write!(f, "{}", name)
    }
}

/// Outcome recorded with an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
    Info,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "SUCCESS"),
            AuditStatus::Failure => write!(f, "FAILURE"),
            AuditStatus::Info => write!(f, "INFO"),
        }
    }
}

/// Kinds of subjects an entry can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Artifact,
    Schedule,
    RestorePoint,
    System,
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectType::Artifact => write!(f, "Artifact"),
            SubjectType::Schedule => write!(f, "Schedule"),
            SubjectType::RestorePoint => write!(f, "RestorePoint"),
            SubjectType::System => write!(f, "System"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the action occurred (UTC)
    pub timestamp: DateTime<Utc>,

    pub subject_type: SubjectType,

    /// ID of the artifact / schedule / restore point, in its display form
    pub subject_id: String,

    pub action: AuditAction,

    pub status: AuditStatus,

    pub message: String,

    pub actor: String,

    /// Structured extras (counts, error lists)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        subject_type: SubjectType,
        subject_id: impl ToString,
        action: AuditAction,
        status: AuditStatus,
        message: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            subject_type,
            subject_id: subject_id.to_string(),
            action,
            status,
            message: message.into(),
            actor: actor.into(),
            details: None,
        }
    }

    pub fn success(
        subject_type: SubjectType,
        subject_id: impl ToString,
        action: AuditAction,
        message: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self::new(subject_type, subject_id, action, AuditStatus::Success, message, actor)
    }

    pub fn failure(
        subject_type: SubjectType,
        subject_id: impl ToString,
        action: AuditAction,
        message: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self::new(subject_type, subject_id, action, AuditStatus::Failure, message, actor)
    }

    pub fn info(
        subject_type: SubjectType,
        subject_id: impl ToString,
        action: AuditAction,
        message: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self::new(subject_type, subject_id, action, AuditStatus::Info, message, actor)
    }

    /// Attach a serializable value as `details`
    pub fn with_details<T: Serialize>(mut self, details: &T) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        format!(
            "[{}] {} {} {} {} by {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.status,
            self.action,
            self.subject_type,
            self.subject_id,
            self.actor,
            self.message
        )
    }
}
