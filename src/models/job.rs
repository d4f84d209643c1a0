//! Durable backup job record
//!
//! Every accepted `create_backup` call leaves one job in the queue store so a
//! restart can tell which artifacts were never started and which were cut off
//! mid-run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ArtifactId, JobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, waiting for a worker
    Queued,
    /// A worker took it; the artifact may be mid-packaging
    Claimed,
    Finished,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Claimed => write!(f, "CLAIMED"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub artifact_id: ArtifactId,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn queued(artifact_id: ArtifactId) -> Self {
        Self {
            id: JobId::new(),
            artifact_id,
            state: JobState::Queued,
            enqueued_at: Utc::now(),
            claimed_at: None,
            finished_at: None,
        }
    }
}
