//! Audit logging system for Rollcall
//!
//! Records every backup, restore, restore point and schedule action with its
//! outcome and actor in an append-only audit log.
//!
//! # Architecture
//!
//! - `AuditEntry`: one record with timestamp, subject, action, status,
//!   message and actor.
//! - `AuditLogger`: appends entries to a line-delimited JSON file (JSONL) and
//!   runs the global retention sweep.
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall::audit::{AuditAction, AuditEntry, AuditLogger, SubjectType};
//!
//! let logger = AuditLogger::new(paths.audit_log());
//! logger.log(&AuditEntry::success(
//!     SubjectType::Artifact,
//!     artifact.id,
//!     AuditAction::BackupCompleted,
//!     "Backup completed",
//!     "admin",
//! ))?;
//! ```

mod entry;
mod logger;

pub use entry::{AuditAction, AuditEntry, AuditStatus, SubjectType};
pub use logger::AuditLogger;
