//! Restore display formatting

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::models::RestorePoint;
use crate::restore::{RestorePreview, RestoreResult, RestoreValidation};

use super::{format_optional_time, format_size, format_time};

/// Format a restore preview
pub fn format_preview(preview: &RestorePreview) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Restore preview for {} ({} backup, captured {})\n\n",
        preview.artifact_id,
        preview.kind,
        format_time(preview.captured_at)
    ));

    output.push_str(&format!("  Files carried by this backup: {}\n", preview.files.len()));
    for file in &preview.files {
        output.push_str(&format!("    {} ({})\n", file.path, format_size(file.size_bytes)));
    }
    if !preview.inherited.is_empty() {
        output.push_str(&format!(
            "  Unchanged files from earlier backups: {}\n",
            preview.inherited.len()
        ));
    }
    for table in &preview.tables {
        output.push_str(&format!(
            "  table {}: {} row(s) from {}\n",
            table.table, table.row_count, table.source_artifact_id
        ));
    }
    if !preview.removed_paths.is_empty() {
        output.push_str(&format!(
            "  Deleted before backup (left untouched): {}\n",
            preview.removed_paths.len()
        ));
    }
    if !preview.conflicts.is_empty() {
        output.push_str("\n  Conflicts (use --force to overwrite):\n");
        for conflict in &preview.conflicts {
            output.push_str(&format!("    {}\n", conflict));
        }
    }

    output.push_str(&format!(
        "\nTotal: {} file(s), {}\n",
        preview.file_count(),
        format_size(preview.total_size_bytes)
    ));
    output
}

/// Format a validation report
pub fn format_validation(validation: &RestoreValidation) -> String {
    let mut output = String::new();
    output.push_str(if validation.is_valid {
        "Backup is restorable\n"
    } else {
        "Backup is NOT restorable\n"
    });
    if !validation.chain.is_empty() {
        let chain: Vec<String> = validation.chain.iter().map(|id| id.to_string()).collect();
        output.push_str(&format!("  Chain: {}\n", chain.join(" <- ")));
    }
    for error in &validation.errors {
        output.push_str(&format!("  error: {}\n", error));
    }
    for warning in &validation.warnings {
        output.push_str(&format!("  warning: {}\n", warning));
    }
    output
}

pub fn format_result(result: &RestoreResult) -> String {
    let mut output = String::new();
    if result.success {
        output.push_str(&format!("{}\n", result.summary()));
    } else {
        output.push_str("Restore failed\n");
    }
    for error in &result.validation_errors {
        output.push_str(&format!("  error: {}\n", error));
    }
    for warning in &result.warnings {
        output.push_str(&format!("  warning: {}\n", warning));
    }
    if let Some(snapshot) = result.safety_snapshot_id {
        output.push_str(&format!("  Safety snapshot: {}\n", snapshot));
    }
    if let Some(point) = result.restore_point_id {
        output.push_str(&format!("  Restore point: {}\n", point));
    }
    output
}

#[derive(Tabled)]
struct PointRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Backup")]
    artifact: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Uses")]
    uses: u32,
    #[tabled(rename = "Last used")]
    last_used: String,
}

pub fn format_restore_points(points: &[RestorePoint]) -> String {
    if points.is_empty() {
        return "No restore points found.".to_string();
    }
    let rows: Vec<PointRow> = points
        .iter()
        .map(|p| PointRow {
            id: p.id.to_string(),
            name: p.name.clone(),
            artifact: p.artifact_id.to_string(),
            status: p.status.to_string(),
            uses: p.use_count,
            last_used: format_optional_time(p.last_used_at),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::psql());
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_lists_errors() {
        let result = RestoreResult {
            validation_errors: vec!["checksum mismatch".into()],
            ..RestoreResult::default()
        };
        let out = format_result(&result);
        assert!(out.starts_with("Restore failed"));
        assert!(out.contains("error: checksum mismatch"));
    }
}
