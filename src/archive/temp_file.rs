//! RAII cleanup for partially written artifact files

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Deletes the wrapped file on drop unless it was persisted
///
/// Every exit path of packaging (error, cancellation, timeout, panic) drops
/// the guard, so no partial artifact is ever left behind.
pub struct TempFileGuard {
    path: PathBuf,
    persisted: bool,
}

impl TempFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Move the file to its final location and disarm the guard
    pub fn persist_to(&mut self, dest: &Path) -> std::io::Result<()> {
        std::fs::rename(&self.path, dest)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.persisted || !self.path.exists() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed partial artifact"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove partial artifact"),
        }
    }
}

impl std::fmt::Debug for TempFileGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempFileGuard")
            .field("path", &self.path)
            .field("persisted", &self.persisted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dropped_guard_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.partial");
        std::fs::write(&path, b"half").unwrap();
        {
            let _guard = TempFileGuard::new(path.clone());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_persisted_file_survives() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.partial");
        let dest = temp_dir.path().join("a.rcva");
        std::fs::write(&path, b"whole").unwrap();
        {
            let mut guard = TempFileGuard::new(path.clone());
            guard.persist_to(&dest).unwrap();
            assert!(guard.is_persisted());
        }
        assert!(dest.exists());
        assert!(!path.exists());
    }
}
