//! On-disk artifact layout
//!
//! ```text
//! +-------+---------+----------------+------------------+---------+
//! | RCVA  | version | header_len u32 | header JSON      | payload |
//! +-------+---------+----------------+------------------+---------+
//! ```
//!
//! The header is plaintext JSON carrying the manifest, so previews and
//! change detection never need the key or a decompression pass. The payload
//! is a JSON `PayloadBody`, gzip-compressed and then optionally sealed with
//! AES-256-GCM; `payload_sha256` covers the stored bytes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrackedRoot;
use crate::dataset::TableExport;
use crate::models::{ArtifactId, BackupKind, CompressionLevel};

pub const MAGIC: &[u8; 4] = b"RCVA";
pub const FORMAT_VERSION: u8 = 1;
/// Artifact file extension
pub const EXTENSION: &str = "rcva";
/// Refuse headers larger than this when reading
pub const MAX_HEADER_LEN: u32 = 64 * 1024 * 1024;

/// One backed-up file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// `<root name>/<path relative to the root>`, always `/`-separated
    pub path: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub sha256: String,
}

/// A file unchanged since the base, carried by an older chain member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritedEntry {
    #[serde(flatten)]
    pub file: FileEntry,
    pub source_artifact_id: ArtifactId,
}

/// Table metadata recorded at backup time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_water_mark: Option<DateTime<Utc>>,
    /// Approximate rows changed since the base (all rows for a full export)
    pub changed_rows: u64,
    /// Artifact whose payload holds this table's export
    pub source_artifact_id: ArtifactId,
}

/// The manifest: everything needed to restore, without the payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub roots: Vec<TrackedRoot>,
    /// Files whose contents are in this artifact's payload
    #[serde(default)]
    pub files: Vec<FileEntry>,
    /// Files restored from earlier chain members
    #[serde(default)]
    pub inherited: Vec<InheritedEntry>,
    /// Paths present in the base but gone at backup time
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub tables: BTreeMap<String, TableMeta>,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

/// Where the bytes of a file in the effective index live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub file: FileEntry,
    pub source_artifact_id: ArtifactId,
}

impl Manifest {
    /// Own and inherited files keyed by path
    pub fn effective_index(&self, own_id: ArtifactId) -> BTreeMap<String, IndexedFile> {
        let mut index = BTreeMap::new();
        for inherited in &self.inherited {
            index.insert(
                inherited.file.path.clone(),
                IndexedFile {
                    file: inherited.file.clone(),
                    source_artifact_id: inherited.source_artifact_id,
                },
            );
        }
        for file in &self.files {
            index.insert(
                file.path.clone(),
                IndexedFile {
                    file: file.clone(),
                    source_artifact_id: own_id,
                },
            );
        }
        index
    }
}

/// Encryption parameters of a sealed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionInfo {
    pub algorithm: String,
    /// Base64 nonce
    pub nonce: String,
    /// Fingerprint of the key that sealed the payload
    pub key_fingerprint: String,
}

/// The plaintext header of an artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub format_version: u8,
    pub artifact_id: ArtifactId,
    pub kind: BackupKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_artifact_id: Option<ArtifactId>,
    pub created_at: DateTime<Utc>,
    pub compression: CompressionLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionInfo>,
    pub payload_len: u64,
    pub payload_sha256: String,
    pub manifest: Manifest,
}

/// The decoded payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadBody {
    /// Base64 file contents keyed by manifest path
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub tables: Vec<TableExport>,
}
