//! `DatasetStore` over a directory of JSON table files
//!
//! Each table lives in `<dir>/<table>.json` as `{ "rows": [ {...}, ... ] }`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{VaultError, VaultResult};
use crate::storage::{read_json, write_json_atomic};

use super::{DatasetStore, TableExport, TableStats};

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct TableFile {
    #[serde(default)]
    rows: Vec<Value>,
}

pub struct JsonDatasetStore {
    dir: PathBuf,
    /// Explicit table list; empty means every `*.json` file in `dir`
    tables: Vec<String>,
    watermark_column: String,
}

impl JsonDatasetStore {
    pub fn new(dir: PathBuf, tables: Vec<String>, watermark_column: impl Into<String>) -> Self {
        Self {
            dir,
            tables,
            watermark_column: watermark_column.into(),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn table_path(&self, table: &str) -> VaultResult<PathBuf> {
        if table.is_empty()
            || table.starts_with('.')
            || table.contains(['/', '\\'])
        {
            return Err(VaultError::Validation(format!(
                "Invalid table name: '{}'",
                table
            )));
        }
        Ok(self.dir.join(format!("{}.json", table)))
    }

    fn read_rows(&self, table: &str) -> VaultResult<Vec<Value>> {
        let file: TableFile = read_json(self.table_path(table)?)?;
        Ok(file.rows)
    }

    fn watermark(&self, row: &Value) -> Option<DateTime<Utc>> {
        row.get(&self.watermark_column)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl DatasetStore for JsonDatasetStore {
    fn tables(&self) -> VaultResult<Vec<String>> {
        if !self.tables.is_empty() {
            return Ok(self.tables.clone());
        }
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut tables = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !stem.starts_with('.') {
                        tables.push(stem.to_string());
                    }
                }
            }
        }
        tables.sort();
        Ok(tables)
    }

    fn table_stats(&self, table: &str) -> VaultResult<TableStats> {
        let rows = self.read_rows(table)?;
        Ok(TableStats {
            row_count: rows.len() as u64,
            high_water_mark: rows.iter().filter_map(|r| self.watermark(r)).max(),
        })
    }

    fn rows_modified_since(&self, table: &str, since: DateTime<Utc>) -> VaultResult<u64> {
        let rows = self.read_rows(table)?;
        Ok(rows
            .iter()
            .filter_map(|r| self.watermark(r))
            .filter(|at| *at > since)
            .count() as u64)
    }

    fn export_table(&self, table: &str) -> VaultResult<TableExport> {
        Ok(TableExport {
            table: table.to_string(),
            rows: self.read_rows(table)?,
        })
    }

    fn import_table(&self, export: &TableExport) -> VaultResult<u64> {
        let path = self.table_path(&export.table)?;
        write_json_atomic(
            &path,
            &TableFile {
                rows: export.rows.clone(),
            },
        )?;
        Ok(export.rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_with_attendance() -> (TempDir, JsonDatasetStore) {
        let temp_dir = TempDir::new().unwrap();
        let rows = json!({"rows": [
            {"id": 1, "student": "Ada", "updated_at": "2024-01-01T08:00:00Z"},
            {"id": 2, "student": "Grace", "updated_at": "2024-01-03T08:00:00Z"},
            {"id": 3, "student": "Alan"}
        ]});
        std::fs::write(
            temp_dir.path().join("attendance.json"),
            serde_json::to_vec(&rows).unwrap(),
        )
        .unwrap();
        let store = JsonDatasetStore::new(temp_dir.path().to_path_buf(), vec![], "updated_at");
        (temp_dir, store)
    }

    #[test]
    fn test_discovers_tables() {
        let (_temp, store) = store_with_attendance();
        assert_eq!(store.tables().unwrap(), vec!["attendance".to_string()]);
    }

    #[test]
    fn test_stats_and_watermark() {
        let (_temp, store) = store_with_attendance();
        let stats = store.table_stats("attendance").unwrap();
        assert_eq!(stats.row_count, 3);
        assert_eq!(
            stats.high_water_mark.unwrap().to_rfc3339(),
            "2024-01-03T08:00:00+00:00"
        );

        let since = DateTime::parse_from_rfc3339("2024-01-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(store.rows_modified_since("attendance", since).unwrap(), 1);
    }

    #[test]
    fn test_missing_table_is_empty() {
        let (_temp, store) = store_with_attendance();
        assert_eq!(store.table_stats("sessions").unwrap(), TableStats::default());
    }

    #[test]
    fn test_export_import_replaces_contents() {
        let (_temp, store) = store_with_attendance();
        let mut export = store.export_table("attendance").unwrap();
        export.rows.truncate(1);

        assert_eq!(store.import_table(&export).unwrap(), 1);
        assert_eq!(store.table_stats("attendance").unwrap().row_count, 1);
    }

    #[test]
    fn test_rejects_path_like_table_names() {
        let (_temp, store) = store_with_attendance();
        assert!(store.export_table("../secrets").unwrap_err().is_validation());
    }
}
