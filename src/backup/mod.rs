//! Backup system for Rollcall
//!
//! Creates artifacts asynchronously and tracks them through
//! `Pending -> InProgress -> {Completed, Failed}`.
//!
//! # Architecture
//!
//! - `BackupOrchestrator`: accepts requests, owns the worker pool and the
//!   durable job queue, records outcomes
//! - `package`: turns one detection pass into one artifact file
//! - `guard`: scoped worker slots and cancellation/deadline checkpoints
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall::backup::CreateBackupRequest;
//!
//! let artifact = orchestrator
//!     .create_backup(CreateBackupRequest::incremental("registrar"))
//!     .await?;
//! assert_eq!(artifact.status, ArtifactStatus::Pending);
//! ```

mod guard;
mod orchestrator;
mod package;

pub use guard::{ExecutionGuard, ExecutionSlot, TokenRegistry};
pub use orchestrator::{
    ArtifactEvent, BackupOrchestrator, CreateBackupRequest, OrchestratorConfig, RecoveryReport,
    RetentionReport,
};
pub use package::{package, ArtifactDirs, Packaged};
