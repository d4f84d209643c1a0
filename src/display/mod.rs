//! Display formatting for terminal output
//!
//! Lists render as tables through `tabled`; single records render as
//! aligned detail blocks.

pub mod artifact;
pub mod restore;
pub mod schedule;

use chrono::{DateTime, Utc};

pub use artifact::{format_artifact_details, format_artifact_list, format_change_set};
pub use restore::{format_preview, format_restore_points, format_result, format_validation};
pub use schedule::{
    format_recurrence, format_schedule_details, format_schedule_list, format_schedule_logs,
    format_stats,
};

/// Format a file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub fn format_optional_time(at: Option<DateTime<Utc>>) -> String {
    at.map(format_time).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(10 * 1024), "10.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024 / 2), "1.5 MB");
    }

    #[test]
    fn test_missing_time_is_dash() {
        assert_eq!(format_optional_time(None), "-");
    }
}
