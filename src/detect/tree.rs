//! Walking tracked roots and hashing files

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::archive::{FileEntry, IndexedFile};
use crate::config::TrackedRoot;
use crate::error::{VaultError, VaultResult};

/// How a file compares with the base's effective index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    /// Not in the base
    Added,
    /// Content differs from the base
    Modified,
    /// Same content as the base; bytes live in `IndexedFile::source_artifact_id`
    Unchanged(IndexedFile),
}

/// A file found on disk during a scan
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub entry: FileEntry,
    pub source: PathBuf,
    pub state: FileState,
}

/// Streaming SHA-256 of a file
pub fn hash_file(path: &Path) -> VaultResult<String> {
    let file = File::open(path)
        .map_err(|e| VaultError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)
        .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(hex::encode(hasher.finalize()))
}

/// `<root>/<relative path>` with `/` separators
fn manifest_path(root: &TrackedRoot, relative: &Path) -> String {
    let mut out = root.name.clone();
    for component in relative.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

/// Map a manifest path back to a location under the given roots
pub fn resolve_manifest_path(roots: &[TrackedRoot], manifest_path: &str) -> Option<PathBuf> {
    let (root_name, rest) = manifest_path.split_once('/')?;
    let root = roots.iter().find(|r| r.name == root_name)?;
    let mut path = root.path.clone();
    for part in rest.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return None;
        }
        path.push(part);
    }
    Some(path)
}

/// Walk every root in sorted order and classify each regular file
///
/// A file whose size and mtime match the base is not re-hashed. One whose
/// metadata changed is hashed and only reported if the hash differs.
/// `checkpoint` runs before each file.
pub fn scan_roots(
    roots: &[TrackedRoot],
    base: Option<&BTreeMap<String, IndexedFile>>,
    checkpoint: &mut dyn FnMut() -> VaultResult<()>,
) -> VaultResult<BTreeMap<String, ScannedFile>> {
    let mut scanned = BTreeMap::new();

    for root in roots {
        if !root.path.is_dir() {
            return Err(VaultError::Io(format!(
                "Tracked root '{}' is not a readable directory: {}",
                root.name,
                root.path.display()
            )));
        }

        for entry in WalkDir::new(&root.path).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            checkpoint()?;

            let relative = entry
                .path()
                .strip_prefix(&root.path)
                .map_err(|e| VaultError::Io(e.to_string()))?;
            let path = manifest_path(root, relative);
            let metadata = entry.metadata()?;
            let size_bytes = metadata.len();
            let modified_at: DateTime<Utc> = metadata.modified()?.into();

            let previous = base.and_then(|index| index.get(&path));
            let (sha256, state) = match previous {
                Some(prev)
                    if prev.file.size_bytes == size_bytes
                        && prev.file.modified_at == modified_at =>
                {
                    (prev.file.sha256.clone(), FileState::Unchanged(prev.clone()))
                }
                Some(prev) => {
                    let hash = hash_file(entry.path())?;
                    if hash == prev.file.sha256 {
                        (hash, FileState::Unchanged(prev.clone()))
                    } else {
                        (hash, FileState::Modified)
                    }
                }
                None => (hash_file(entry.path())?, FileState::Added),
            };

            scanned.insert(
                path.clone(),
                ScannedFile {
                    entry: FileEntry {
                        path,
                        size_bytes,
                        modified_at,
                        sha256,
                    },
                    source: entry.path().to_path_buf(),
                    state,
                },
            );
        }
    }

    Ok(scanned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_paths_round_trip() {
        let roots = vec![TrackedRoot::new("records", "/srv/records")];
        let path = manifest_path(&roots[0], Path::new("2024/jan.csv"));
        assert_eq!(path, "records/2024/jan.csv");
        assert_eq!(
            resolve_manifest_path(&roots, &path),
            Some(PathBuf::from("/srv/records/2024/jan.csv"))
        );
        assert_eq!(resolve_manifest_path(&roots, "records/../etc/passwd"), None);
        assert_eq!(resolve_manifest_path(&roots, "other/a.csv"), None);
    }

    #[test]
    fn test_scan_without_base_adds_everything() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("sub")).unwrap();
        std::fs::write(temp_dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(temp_dir.path().join("sub/a.txt"), b"a").unwrap();
        let roots = vec![TrackedRoot::new("r", temp_dir.path())];

        let scanned = scan_roots(&roots, None, &mut || Ok(())).unwrap();
        let paths: Vec<_> = scanned.keys().cloned().collect();
        assert_eq!(paths, vec!["r/b.txt", "r/sub/a.txt"]);
        assert!(scanned.values().all(|f| f.state == FileState::Added));
    }

    #[test]
    fn test_checkpoint_can_abort() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();
        let roots = vec![TrackedRoot::new("r", temp_dir.path())];

        let result = scan_roots(&roots, None, &mut || {
            Err(VaultError::Cancelled("stop".into()))
        });
        assert!(matches!(result, Err(VaultError::Cancelled(_))));
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let roots = vec![TrackedRoot::new("r", "/definitely/not/here")];
        assert!(matches!(
            scan_roots(&roots, None, &mut || Ok(())),
            Err(VaultError::Io(_))
        ));
    }

    #[test]
    fn test_hash_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
