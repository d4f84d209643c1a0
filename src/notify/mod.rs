//! Completion and failure notifications
//!
//! The orchestrator and restore engine report outcomes to a
//! `NotificationSink`; delivery (mail, chat, pager) is the sink's concern.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::models::ArtifactId;

/// Notification events
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type")]
pub enum Notification {
    BackupCompleted {
        artifact_id: ArtifactId,
        name: String,
        size_bytes: u64,
        timestamp: DateTime<Utc>,
    },
    BackupFailed {
        artifact_id: ArtifactId,
        name: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    RestoreCompleted {
        artifact_id: ArtifactId,
        files_restored: usize,
        tables_restored: usize,
        timestamp: DateTime<Utc>,
    },
    RestoreFailed {
        artifact_id: ArtifactId,
        errors: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl Notification {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::BackupFailed { .. } | Self::RestoreFailed { .. })
    }
}

/// Receives notifications; implementations must not block for long
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Forwards notifications to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::BackupCompleted {
                artifact_id,
                name,
                size_bytes,
                ..
            } => info!(%artifact_id, %name, size_bytes, "backup completed"),
            Notification::BackupFailed {
                artifact_id,
                name,
                error,
                ..
            } => error!(%artifact_id, %name, %error, "backup failed"),
            Notification::RestoreCompleted {
                artifact_id,
                files_restored,
                tables_restored,
                ..
            } => info!(%artifact_id, files_restored, tables_restored, "restore completed"),
            Notification::RestoreFailed {
                artifact_id, errors, ..
            } => error!(%artifact_id, errors = ?errors, "restore failed"),
        }
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        if let Ok(mut received) = self.received.lock() {
            received.push(notification.clone());
        }
    }
}
