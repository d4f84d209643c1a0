//! Packaging one artifact file from a detection pass
//!
//! Runs on a blocking thread. Every step that can take a while is preceded
//! by a checkpoint, and the finished file is only moved into the artifacts
//! directory after the last one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use tracing::debug;

use crate::archive::{
    format::EXTENSION, sha256_hex, ArtifactWriter, FileEntry, InheritedEntry, Manifest,
    PayloadBody, TableMeta, TempFileGuard,
};
use crate::crypto::DerivedKey;
use crate::detect::{ChangeDetector, FileState};
use crate::error::{VaultError, VaultResult};
use crate::models::{ArtifactId, BackupArtifact, BackupKind};

use super::guard::ExecutionGuard;

/// Where finished and in-flight artifact files live
#[derive(Debug, Clone)]
pub struct ArtifactDirs {
    pub artifacts_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl ArtifactDirs {
    pub fn final_path(&self, id: ArtifactId) -> PathBuf {
        self.artifacts_dir.join(format!("{}.{}", id.full(), EXTENSION))
    }

    pub fn partial_path(&self, id: ArtifactId) -> PathBuf {
        self.temp_dir.join(format!("{}.partial", id.full()))
    }
}

/// A packaged artifact file
#[derive(Debug, Clone)]
pub struct Packaged {
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub files_carried: usize,
    pub files_inherited: usize,
    pub tables_exported: usize,
}

/// Detect, serialize, compress, optionally encrypt and persist `artifact`
pub fn package(
    detector: &ChangeDetector,
    artifact: &BackupArtifact,
    key: Option<&DerivedKey>,
    dirs: &ArtifactDirs,
    guard: &ExecutionGuard,
) -> VaultResult<Packaged> {
    guard.checkpoint()?;

    let base = match (artifact.kind, artifact.base_artifact_id) {
        (BackupKind::Full, _) => None,
        (BackupKind::Incremental, Some(base)) => Some(detector.load_base(base)?),
        (BackupKind::Incremental, None) => {
            return Err(VaultError::Validation(
                "Incremental artifacts require a base artifact".into(),
            ))
        }
    };

    let detection = detector.detect_against(base, &mut || guard.checkpoint())?;
    let incremental = detection.base.is_some();

    let mut manifest = Manifest {
        roots: detector.roots().to_vec(),
        files: Vec::new(),
        inherited: Vec::new(),
        removed: detection.changes.removed_paths.clone(),
        tables: BTreeMap::new(),
        captured_at: Utc::now(),
    };
    let mut body = PayloadBody::default();

    for scanned in detection.files.values() {
        match &scanned.state {
            FileState::Unchanged(indexed) if incremental => {
                // keep the fresh mtime so the next scan can skip hashing
                manifest.inherited.push(InheritedEntry {
                    file: scanned.entry.clone(),
                    source_artifact_id: indexed.source_artifact_id,
                });
            }
            _ => {
                guard.checkpoint()?;
                let bytes = read_source(&scanned.source)?;
                // the file may have changed since it was hashed; record what was read
                manifest.files.push(FileEntry {
                    size_bytes: bytes.len() as u64,
                    sha256: sha256_hex(&bytes),
                    ..scanned.entry.clone()
                });
                body.files
                    .insert(scanned.entry.path.clone(), STANDARD.encode(&bytes));
            }
        }
    }

    let dataset = detector.dataset();
    for (table, change) in &detection.changes.table_changes {
        let inherited_from = detection
            .base
            .as_ref()
            .filter(|_| !change.changed)
            .and_then(|b| b.manifest.tables.get(table))
            .map(|meta| meta.source_artifact_id);

        let source_artifact_id = match inherited_from {
            Some(source) => source,
            None => {
                guard.checkpoint()?;
                body.tables.push(dataset.export_table(table)?);
                artifact.id
            }
        };
        manifest.tables.insert(
            table.clone(),
            TableMeta {
                row_count: change.row_count,
                high_water_mark: change.high_water_mark,
                changed_rows: change.changed_rows,
                source_artifact_id,
            },
        );
    }

    let files_carried = manifest.files.len();
    let files_inherited = manifest.inherited.len();
    let tables_exported = body.tables.len();
    let base_artifact_id = detection.base.as_ref().map(|b| b.artifact.id);
    let kind = if incremental {
        BackupKind::Incremental
    } else {
        BackupKind::Full
    };

    guard.checkpoint()?;
    let mut partial = TempFileGuard::new(dirs.partial_path(artifact.id));
    ArtifactWriter::new(artifact.id, kind, base_artifact_id, artifact.compression, manifest)
        .write(partial.path(), &body, key)?;

    guard.checkpoint()?;
    let file_path = dirs.final_path(artifact.id);
    partial.persist_to(&file_path).map_err(|e| {
        VaultError::Io(format!(
            "Failed to move artifact into {}: {}",
            file_path.display(),
            e
        ))
    })?;
    let size_bytes = std::fs::metadata(&file_path)?.len();

    debug!(
        artifact_id = %artifact.id,
        files_carried,
        files_inherited,
        tables_exported,
        size_bytes,
        "artifact packaged"
    );

    Ok(Packaged {
        file_path,
        size_bytes,
        files_carried,
        files_inherited,
        tables_exported,
    })
}

fn read_source(path: &Path) -> VaultResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArtifactReader;
    use crate::config::TrackedRoot;
    use crate::dataset::{DatasetStore, JsonDatasetStore};
    use crate::models::{ArtifactStatus, StorageLocation};
    use crate::storage::ArtifactRepository;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        dirs: ArtifactDirs,
        repo: Arc<ArtifactRepository>,
        detector: ChangeDetector,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("records");
        let tables = temp.path().join("tables");
        let dirs = ArtifactDirs {
            artifacts_dir: temp.path().join("artifacts"),
            temp_dir: temp.path().join("artifacts/.partial"),
        };
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&tables).unwrap();
        std::fs::create_dir_all(&dirs.temp_dir).unwrap();
        std::fs::write(root.join("a.csv"), "alpha").unwrap();
        std::fs::write(root.join("b.csv"), "bravo").unwrap();
        std::fs::write(
            tables.join("students.json"),
            serde_json::to_vec(&json!({"rows": [{"id": 1, "updated_at": "2020-01-01T00:00:00Z"}]}))
                .unwrap(),
        )
        .unwrap();

        let repo = Arc::new(ArtifactRepository::new(temp.path().join("artifacts.json")));
        let dataset: Arc<dyn DatasetStore> =
            Arc::new(JsonDatasetStore::new(tables, vec![], "updated_at"));
        let detector = ChangeDetector::new(
            Arc::clone(&repo),
            vec![TrackedRoot::new("records", &root)],
            dataset,
        );
        Fixture {
            _temp: temp,
            root,
            dirs,
            repo,
            detector,
        }
    }

    fn guard() -> ExecutionGuard {
        ExecutionGuard::new("Backup", CancellationToken::new(), Duration::from_secs(60))
    }

    fn complete(fx: &Fixture, mut artifact: BackupArtifact, packaged: &Packaged) -> ArtifactId {
        artifact.status = ArtifactStatus::Completed;
        artifact.completed_at = Some(Utc::now());
        artifact.file_path = Some(packaged.file_path.clone());
        let id = artifact.id;
        fx.repo.insert_idempotent(artifact).unwrap();
        id
    }

    #[test]
    fn test_full_then_incremental_carries_only_the_change() {
        let fx = fixture();
        let full = BackupArtifact::new(BackupKind::Full, StorageLocation::Local, "test");
        let packaged = package(&fx.detector, &full, None, &fx.dirs, &guard()).unwrap();
        assert_eq!(packaged.files_carried, 2);
        assert_eq!(packaged.tables_exported, 1);
        let full_id = complete(&fx, full, &packaged);

        std::fs::write(fx.root.join("a.csv"), "alpha, revised").unwrap();
        let mut incr = BackupArtifact::new(BackupKind::Incremental, StorageLocation::Local, "test");
        incr.base_artifact_id = Some(full_id);
        let packaged = package(&fx.detector, &incr, None, &fx.dirs, &guard()).unwrap();
        assert_eq!(packaged.files_carried, 1);
        assert_eq!(packaged.files_inherited, 1);
        assert_eq!(packaged.tables_exported, 0);

        let reader = ArtifactReader::open(&packaged.file_path).unwrap();
        let manifest = reader.manifest();
        assert_eq!(manifest.files[0].path, "records/a.csv");
        assert_eq!(manifest.inherited[0].source_artifact_id, full_id);
        assert_eq!(manifest.tables["students"].source_artifact_id, full_id);
        assert_eq!(reader.header().base_artifact_id, Some(full_id));
    }

    #[test]
    fn test_encrypted_package_records_key_fingerprint() {
        let fx = fixture();
        let key = DerivedKey::from_bytes([3u8; 32]);
        let artifact = BackupArtifact::new(BackupKind::Full, StorageLocation::Local, "test");
        let packaged = package(&fx.detector, &artifact, Some(&key), &fx.dirs, &guard()).unwrap();

        let reader = ArtifactReader::open(&packaged.file_path).unwrap();
        let info = reader.header().encryption.clone().unwrap();
        assert_eq!(info.key_fingerprint, key.fingerprint());
        assert_eq!(reader.read_payload(Some(&key)).unwrap().files.len(), 2);
    }

    #[test]
    fn test_cancelled_package_leaves_no_files() {
        let fx = fixture();
        let token = CancellationToken::new();
        token.cancel();
        let guard = ExecutionGuard::new("Backup", token, Duration::from_secs(60));
        let artifact = BackupArtifact::new(BackupKind::Full, StorageLocation::Local, "test");

        let err = package(&fx.detector, &artifact, None, &fx.dirs, &guard).unwrap_err();
        assert!(matches!(err, VaultError::Cancelled(_)));
        assert!(!fx.dirs.final_path(artifact.id).exists());
        assert_eq!(std::fs::read_dir(&fx.dirs.temp_dir).unwrap().count(), 0);
    }
}
