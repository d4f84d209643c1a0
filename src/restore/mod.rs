//! Restore engine for Rollcall
//!
//! Previews and validations are cheap and read-only. Applied restores are
//! exclusive system-wide and atomic per file and per table.

mod engine;
mod types;

pub use engine::RestoreEngine;
pub use types::{
    ConflictKind, PreviewFile, PreviewTable, RestoreConflict, RestoreOptions, RestoreOutcome,
    RestorePreview, RestoreResult, RestoreValidation,
};
