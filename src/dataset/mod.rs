//! Dataset export/import contract
//!
//! The attendance platform's relational data is reached only through
//! `DatasetStore`. Backups export whole tables; change detection uses row
//! counts and a watermark column as an approximation of changed rows.

mod json_store;

pub use json_store::JsonDatasetStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VaultResult;

/// Row count and newest watermark of one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_water_mark: Option<DateTime<Utc>>,
}

/// A complete export of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableExport {
    pub table: String,
    pub rows: Vec<serde_json::Value>,
}

/// Export/import access to the platform's tables
pub trait DatasetStore: Send + Sync {
    /// Tables included in backups
    fn tables(&self) -> VaultResult<Vec<String>>;

    fn table_stats(&self, table: &str) -> VaultResult<TableStats>;

    /// Rows whose watermark column is strictly after `since`
    fn rows_modified_since(&self, table: &str, since: DateTime<Utc>) -> VaultResult<u64>;

    fn export_table(&self, table: &str) -> VaultResult<TableExport>;

    /// Replace the table's contents; all-or-nothing per table
    fn import_table(&self, export: &TableExport) -> VaultResult<u64>;
}
