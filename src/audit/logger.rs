//! Audit logger for append-only audit log
//!
//! Provides the AuditLogger struct that writes audit entries to a log file.
//! Each entry is written as a single JSON line and flushed immediately.
//! Workers, the restore engine and the ticker share one logger, so appends
//! are serialised by an internal mutex.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{VaultError, VaultResult};
use crate::storage::write_bytes_atomic;

use super::entry::AuditEntry;

/// Handles writing audit entries to the audit log file
///
/// The log file uses a line-delimited JSON format (JSONL) where each line
/// is a complete JSON object representing one audit entry.
pub struct AuditLogger {
    /// Path to the audit log file
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLogger {
    /// Create a new AuditLogger that writes to the specified path
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            log_path,
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> VaultResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire audit lock: {}", e)))
    }

    /// Log an audit entry
    ///
    /// Appends the entry as a JSON line to the audit log file.
    pub fn log(&self, entry: &AuditEntry) -> VaultResult<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| VaultError::Json(format!("Failed to serialize audit entry: {}", e)))?;

        let _guard = self.lock()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| VaultError::Io(format!("Failed to open audit log: {}", e)))?;

        writeln!(file, "{}", json)
            .map_err(|e| VaultError::Io(format!("Failed to write audit entry: {}", e)))?;

        file.flush()
            .map_err(|e| VaultError::Io(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// Log an entry, downgrading a write failure to a warning
    ///
    /// Used on background paths where the operation itself already succeeded
    /// or failed and must not be masked by an audit I/O error.
    pub fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.log(&entry) {
            warn!(action = %entry.action, subject = %entry.subject_id, error = %e, "failed to write audit entry");
        }
    }

    /// Read all audit entries from the log file
    ///
    /// Returns entries in chronological order (oldest first).
    pub fn read_all(&self) -> VaultResult<Vec<AuditEntry>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)
            .map_err(|e| VaultError::Io(format!("Failed to open audit log: {}", e)))?;

        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                VaultError::Io(format!("Failed to read audit log line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let entry: AuditEntry = serde_json::from_str(&line).map_err(|e| {
                VaultError::Json(format!(
                    "Failed to parse audit entry at line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;

            entries.push(entry);
        }

        Ok(entries)
    }

    /// Read the most recent N entries from the log
    pub fn read_recent(&self, count: usize) -> VaultResult<Vec<AuditEntry>> {
        let all_entries = self.read_all()?;
        let start = all_entries.len().saturating_sub(count);
        Ok(all_entries[start..].to_vec())
    }

    /// Entries about one subject, oldest first
    pub fn for_subject(&self, subject_id: &str) -> VaultResult<Vec<AuditEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.subject_id == subject_id)
            .collect())
    }

    /// Remove entries older than `cutoff`, rewriting the log atomically
    ///
    /// The retention sweep is the only operation that removes entries.
    pub fn sweep(&self, cutoff: DateTime<Utc>) -> VaultResult<usize> {
        let _guard = self.lock()?;
        let entries = self.read_all()?;
        let before = entries.len();

        let mut kept = Vec::new();
        for entry in entries.iter().filter(|e| e.timestamp >= cutoff) {
            let json = serde_json::to_string(entry)
                .map_err(|e| VaultError::Json(format!("Failed to serialize audit entry: {}", e)))?;
            kept.extend_from_slice(json.as_bytes());
            kept.push(b'\n');
        }

        let removed = before - entries.iter().filter(|e| e.timestamp >= cutoff).count();
        if removed > 0 {
            write_bytes_atomic(&self.log_path, &kept)?;
        }
        Ok(removed)
    }
}
