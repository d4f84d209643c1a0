//! Backup artifact model
//!
//! An artifact is one packaged backup file plus the metadata record that
//! tracks its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::ids::ArtifactId;

/// What an artifact captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// The entire tracked tree and every tracked table
    #[default]
    Full,
    /// Only what changed since a base artifact
    Incremental,
}

impl BackupKind {
    /// Parse a backup kind from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "incremental" | "incr" | "inc" => Some(Self::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "FULL"),
            Self::Incremental => write!(f, "INCREMENTAL"),
        }
    }
}

/// Deployment target recorded on the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    #[default]
    Local,
    Cloud,
    Hybrid,
}

impl StorageLocation {
    /// Parse a storage location from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" => Some(Self::Local),
            "cloud" => Some(Self::Cloud),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "LOCAL"),
            Self::Cloud => write!(f, "CLOUD"),
            Self::Hybrid => write!(f, "HYBRID"),
        }
    }
}

/// Lifecycle status of an artifact
///
/// Transitions are strictly `Pending -> InProgress -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ArtifactStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: ArtifactStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }

    /// Parse a status from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "running" => Some(Self::InProgress),
            "completed" | "done" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Payload compression level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    None,
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionLevel {
    /// Parse a compression level from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "low" | "fast" => Some(Self::Low),
            "medium" | "default" => Some(Self::Medium),
            "high" | "best" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// A backup artifact record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupArtifact {
    /// Unique identifier
    pub id: ArtifactId,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub kind: BackupKind,

    pub location: StorageLocation,

    pub status: ArtifactStatus,

    /// Size of the artifact file once completed
    #[serde(default)]
    pub size_bytes: u64,

    /// Final location of the artifact file (set on completion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    pub is_encrypted: bool,

    #[serde(default)]
    pub compression: CompressionLevel,

    /// Days to keep the artifact after it reaches a terminal state
    pub retention_days: u32,

    /// Parent in the incremental chain (required for incremental artifacts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_artifact_id: Option<ArtifactId>,

    /// Caller-supplied key that makes `create_backup` idempotent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    pub created_by: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BackupArtifact {
    /// Create a new pending artifact
    pub fn new(kind: BackupKind, location: StorageLocation, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        let id = ArtifactId::new();
        Self {
            id,
            name: default_name(kind, now),
            description: String::new(),
            kind,
            location,
            status: ArtifactStatus::Pending,
            size_bytes: 0,
            file_path: None,
            is_encrypted: false,
            compression: CompressionLevel::default(),
            retention_days: 30,
            base_artifact_id: None,
            idempotency_key: None,
            created_by: created_by.into(),
            created_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Whether the artifact finished successfully
    pub fn is_completed(&self) -> bool {
        self.status == ArtifactStatus::Completed
    }

    /// The instant retention is measured from
    pub fn retention_anchor(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }

    /// Whether the retention period has elapsed at `now`
    ///
    /// Only terminal artifacts ever expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_terminal()
            && self.retention_anchor() + chrono::Duration::days(i64::from(self.retention_days)) <= now
    }

    /// Validate the record's internal consistency
    pub fn validate(&self) -> Result<(), ArtifactValidationError> {
        if self.name.trim().is_empty() {
            return Err(ArtifactValidationError::EmptyName);
        }
        if self.name.len() > 200 {
            return Err(ArtifactValidationError::NameTooLong(self.name.len()));
        }
        if self.retention_days == 0 {
            return Err(ArtifactValidationError::ZeroRetention);
        }
        if self.kind == BackupKind::Incremental && self.base_artifact_id.is_none() {
            return Err(ArtifactValidationError::MissingBase);
        }
        Ok(())
    }
}

fn default_name(kind: BackupKind, at: DateTime<Utc>) -> String {
    let prefix = match kind {
        BackupKind::Full => "full",
        BackupKind::Incremental => "incremental",
    };
    format!("{}-{}", prefix, at.format("%Y%m%d-%H%M%S"))
}

impl fmt::Display for BackupArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {}, {})", self.name, self.id, self.kind, self.status)
    }
}

/// Validation errors for artifact records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactValidationError {
    EmptyName,
    NameTooLong(usize),
    ZeroRetention,
    MissingBase,
}

impl fmt::Display for ArtifactValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Artifact name cannot be empty"),
            Self::NameTooLong(len) => {
                write!(f, "Artifact name too long ({} chars, max 200)", len)
            }
            Self::ZeroRetention => write!(f, "Retention must be at least one day"),
            Self::MissingBase => write!(f, "Incremental artifacts require a base artifact"),
        }
    }
}

impl std::error::Error for ArtifactValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_forward_transitions_are_legal() {
        use ArtifactStatus::*;
        let all = [Pending, InProgress, Completed, Failed];
        for from in all {
            for to in all {
                let expected = matches!(
                    (from, to),
                    (Pending, InProgress) | (InProgress, Completed) | (InProgress, Failed)
                );
                assert_eq!(from.can_transition_to(to), expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(ArtifactStatus::Completed.is_terminal());
        assert!(ArtifactStatus::Failed.is_terminal());
        assert!(!ArtifactStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_incremental_requires_base() {
        let artifact = BackupArtifact::new(BackupKind::Incremental, StorageLocation::Local, "admin");
        assert_eq!(artifact.validate(), Err(ArtifactValidationError::MissingBase));
    }

    #[test]
    fn test_expiry_only_for_terminal() {
        let mut artifact = BackupArtifact::new(BackupKind::Full, StorageLocation::Local, "admin");
        artifact.retention_days = 1;
        let later = artifact.created_at + chrono::Duration::days(2);
        assert!(!artifact.is_expired(later));

        artifact.status = ArtifactStatus::Failed;
        assert!(artifact.is_expired(later));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(BackupKind::parse("incr"), Some(BackupKind::Incremental));
        assert_eq!(StorageLocation::parse("CLOUD"), Some(StorageLocation::Cloud));
        assert_eq!(ArtifactStatus::parse("in-progress"), Some(ArtifactStatus::InProgress));
        assert_eq!(CompressionLevel::parse("best"), Some(CompressionLevel::High));
        assert_eq!(CompressionLevel::parse("ultra"), None);
    }
}
