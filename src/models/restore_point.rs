//! Restore point model
//!
//! A named, reusable reference to a completed artifact that rollback targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ArtifactId, RestorePointId};

/// Status of a restore point
///
/// `Used` is informational: a used point may be rolled back to again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestorePointStatus {
    #[default]
    Available,
    Used,
    Expired,
}

impl fmt::Display for RestorePointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "AVAILABLE"),
            Self::Used => write!(f, "USED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A rollback target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestorePoint {
    pub id: RestorePointId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub artifact_id: ArtifactId,
    pub status: RestorePointStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub use_count: u32,
}

impl RestorePoint {
    pub fn new(
        artifact_id: ArtifactId,
        name: impl Into<String>,
        description: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: RestorePointId::new(),
            name: name.into(),
            description: description.into(),
            artifact_id,
            status: RestorePointStatus::Available,
            created_by: created_by.into(),
            created_at: Utc::now(),
            last_used_at: None,
            use_count: 0,
        }
    }

    /// Whether a rollback may target this point
    pub fn is_usable(&self) -> bool {
        self.status != RestorePointStatus::Expired
    }

    /// Record a successful rollback
    pub fn mark_used(&mut self, at: DateTime<Utc>) {
        if self.status != RestorePointStatus::Expired {
            self.status = RestorePointStatus::Used;
        }
        self.last_used_at = Some(at);
        self.use_count += 1;
    }

    pub fn expire(&mut self) {
        self.status = RestorePointStatus::Expired;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_point_stays_usable() {
        let mut point = RestorePoint::new(ArtifactId::new(), "before-term", "", "admin");
        point.mark_used(Utc::now());
        point.mark_used(Utc::now());
        assert_eq!(point.status, RestorePointStatus::Used);
        assert_eq!(point.use_count, 2);
        assert!(point.is_usable());
    }

    #[test]
    fn test_expired_point_not_usable() {
        let mut point = RestorePoint::new(ArtifactId::new(), "old", "", "admin");
        point.expire();
        assert!(!point.is_usable());
        point.mark_used(Utc::now());
        assert_eq!(point.status, RestorePointStatus::Expired);
    }
}
