//! Artifact display formatting

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::detect::{ChangeKind, ChangeSet};
use crate::models::BackupArtifact;

use super::{format_optional_time, format_size, format_time};

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Base")]
    base: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&BackupArtifact> for ArtifactRow {
    fn from(artifact: &BackupArtifact) -> Self {
        let mut status = artifact.status.to_string();
        if artifact.is_encrypted {
            status.push_str(" (enc)");
        }
        Self {
            id: artifact.id.to_string(),
            name: artifact.name.clone(),
            kind: artifact.kind.to_string(),
            status,
            size: format_size(artifact.size_bytes),
            base: artifact
                .base_artifact_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            created: format_time(artifact.created_at),
        }
    }
}

/// Format artifacts as a table
pub fn format_artifact_list(artifacts: &[BackupArtifact]) -> String {
    if artifacts.is_empty() {
        return "No backups found.".to_string();
    }
    let rows: Vec<ArtifactRow> = artifacts.iter().map(ArtifactRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::psql());
    format!("{}\n\nTotal: {} backup(s)", table, artifacts.len())
}

/// Format a single artifact with its chain
pub fn format_artifact_details(artifact: &BackupArtifact, chain: &[BackupArtifact]) -> String {
    let mut output = String::new();

    output.push_str(&format!("Backup: {}\n", artifact.name));
    output.push_str(&format!("  ID:          {}\n", artifact.id.full()));
    output.push_str(&format!("  Kind:        {}\n", artifact.kind));
    output.push_str(&format!("  Status:      {}\n", artifact.status));
    output.push_str(&format!("  Location:    {}\n", artifact.location));
    output.push_str(&format!("  Compression: {}\n", artifact.compression));
    output.push_str(&format!(
        "  Encrypted:   {}\n",
        if artifact.is_encrypted { "Yes" } else { "No" }
    ));
    output.push_str(&format!("  Size:        {}\n", format_size(artifact.size_bytes)));
    output.push_str(&format!("  Retention:   {} day(s)\n", artifact.retention_days));
    if let Some(ref path) = artifact.file_path {
        output.push_str(&format!("  File:        {}\n", path.display()));
    }
    if !artifact.description.is_empty() {
        output.push_str(&format!("  Description: {}\n", artifact.description));
    }

    output.push('\n');
    output.push_str(&format!("  Created:   {}\n", format_time(artifact.created_at)));
    output.push_str(&format!(
        "  Started:   {}\n",
        format_optional_time(artifact.started_at)
    ));
    output.push_str(&format!(
        "  Completed: {}\n",
        format_optional_time(artifact.completed_at)
    ));
    output.push_str(&format!("  Created by: {}\n", artifact.created_by));

    if let Some(ref error) = artifact.error_message {
        output.push('\n');
        output.push_str(&format!("  Error: {}\n", error));
    }

    if chain.len() > 1 {
        output.push('\n');
        output.push_str("  Chain (newest first):\n");
        for member in chain {
            output.push_str(&format!(
                "    {} {} {}\n",
                member.id, member.kind, member.name
            ));
        }
    }

    output
}

/// Format what a backup taken now would carry
pub fn format_change_set(changes: &ChangeSet) -> String {
    let mut output = String::new();

    match changes.resolved_base_artifact_id {
        Some(base) => output.push_str(&format!("Changes since {}\n", base)),
        None => output.push_str("No completed backup yet, everything is new\n"),
    }
    output.push('\n');

    if changes.changed_files.is_empty() && changes.removed_paths.is_empty() {
        output.push_str("  Files: no changes\n");
    }
    for file in &changes.changed_files {
        let marker = match file.change {
            ChangeKind::Added => "+",
            ChangeKind::Modified => "~",
        };
        output.push_str(&format!(
            "  {} {} ({})\n",
            marker,
            file.path,
            format_size(file.size_bytes)
        ));
    }
    for path in &changes.removed_paths {
        output.push_str(&format!("  - {}\n", path));
    }

    if !changes.table_changes.is_empty() {
        output.push('\n');
        for (table, change) in &changes.table_changes {
            let state = if change.changed {
                format!("{} changed row(s)", change.changed_rows)
            } else {
                "unchanged".to_string()
            };
            output.push_str(&format!(
                "  table {}: {} row(s), {}\n",
                table, change.row_count, state
            ));
        }
    }

    output.push('\n');
    output.push_str(&format!(
        "Total: {} file(s), {}\n",
        changes.changed_files.len(),
        format_size(changes.total_size_bytes)
    ));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackupKind, StorageLocation};

    #[test]
    fn test_empty_list() {
        assert_eq!(format_artifact_list(&[]), "No backups found.");
    }

    #[test]
    fn test_list_shows_name_and_status() {
        let artifact = BackupArtifact::new(BackupKind::Full, StorageLocation::Local, "alice");
        let out = format_artifact_list(std::slice::from_ref(&artifact));
        assert!(out.contains(&artifact.name));
        assert!(out.contains("PENDING"));
        assert!(out.contains("Total: 1 backup(s)"));
    }
}
