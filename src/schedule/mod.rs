//! Recurring backups
//!
//! `recurrence` turns a rule into the next UTC run time; `engine` owns the
//! schedule lifecycle, the execution log and the background ticker.

mod engine;
pub mod recurrence;

pub use engine::{ScheduleEngine, ScheduleStats, TickReport};
pub use recurrence::next_run;
