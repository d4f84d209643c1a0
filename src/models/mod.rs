//! Core data models for Rollcall
//!
//! This module contains the records the backup subsystem persists: artifacts,
//! restore points, schedules, their execution log and the durable job queue.

pub mod artifact;
pub mod ids;
pub mod job;
pub mod restore_point;
pub mod schedule;

pub use artifact::{ArtifactStatus, BackupArtifact, BackupKind, CompressionLevel, StorageLocation};
pub use ids::{ArtifactId, JobId, RestorePointId, ScheduleId, ScheduleLogId};
pub use job::{JobRecord, JobState};
pub use restore_point::{RestorePoint, RestorePointStatus};
pub use schedule::{
    Frequency, Recurrence, Schedule, ScheduleConfig, ScheduleLogEntry, ScheduleRunStatus,
};
