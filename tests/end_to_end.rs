//! Full -> modify -> incremental -> preview, through the public API

use std::fs;
use std::path::Path;

use rollcall::backup::CreateBackupRequest;
use rollcall::config::{Settings, TrackedRoot, VaultPaths};
use rollcall::models::{ArtifactStatus, BackupKind};
use rollcall::restore::{RestoreOptions, RestoreOutcome};
use rollcall::vault::Vault;
use tempfile::TempDir;

fn write_tree(root: &Path) {
    fs::create_dir_all(root.join("2025")).unwrap();
    // three files, 10 KB in total
    fs::write(root.join("roster.csv"), vec![b'r'; 4096]).unwrap();
    fs::write(root.join("2025/january.csv"), vec![b'j'; 3072]).unwrap();
    fs::write(root.join("2025/february.csv"), vec![b'f'; 3072]).unwrap();
}

fn open_vault(temp: &TempDir) -> (Vault, std::path::PathBuf) {
    let root = temp.path().join("records");
    write_tree(&root);
    let mut settings = Settings::default();
    settings.tracked_roots.push(TrackedRoot::new("records", &root));
    let vault = Vault::open(
        VaultPaths::with_base_dir(temp.path().join("vault")),
        settings,
        None,
    )
    .unwrap();
    (vault, root)
}

#[tokio::test]
async fn test_incremental_carries_only_the_modified_file() {
    let temp = TempDir::new().unwrap();
    let (vault, root) = open_vault(&temp);

    let full = vault
        .backups()
        .create_backup_and_wait(CreateBackupRequest::full("registrar"))
        .await
        .unwrap();
    assert_eq!(full.status, ArtifactStatus::Completed);
    assert!(full.size_bytes > 0);

    fs::write(root.join("2025/february.csv"), vec![b'F'; 3500]).unwrap();

    let changes = vault.backups().detector().detect_changes(Some(full.id)).unwrap();
    assert_eq!(changes.resolved_base_artifact_id, Some(full.id));
    assert_eq!(changes.changed_files.len(), 1);
    assert_eq!(changes.changed_files[0].path, "records/2025/february.csv");
    assert_eq!(changes.total_size_bytes, 3500);

    let incremental = vault
        .backups()
        .create_backup_and_wait(CreateBackupRequest::incremental("registrar").with_base(full.id))
        .await
        .unwrap();
    assert_eq!(incremental.status, ArtifactStatus::Completed);
    assert_eq!(incremental.kind, BackupKind::Incremental);
    assert_eq!(incremental.base_artifact_id, Some(full.id));

    let preview = vault.restores().preview(incremental.id).unwrap();
    assert_eq!(preview.files.len(), 1);
    assert_eq!(preview.files[0].path, "records/2025/february.csv");
    assert_eq!(preview.inherited.len(), 2);
    assert!(preview.inherited.iter().all(|f| f.source_artifact_id == full.id));

    let chain: Vec<_> = vault
        .backups()
        .resolve_chain(incremental.id)
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(chain, vec![incremental.id, full.id]);
}

#[tokio::test]
async fn test_restore_brings_back_deleted_and_edited_files() {
    let temp = TempDir::new().unwrap();
    let (vault, root) = open_vault(&temp);

    vault
        .backups()
        .create_backup_and_wait(CreateBackupRequest::full("registrar"))
        .await
        .unwrap();
    fs::write(root.join("roster.csv"), b"edited after the full backup").unwrap();
    let incremental = vault
        .backups()
        .create_backup_and_wait(CreateBackupRequest::incremental("registrar"))
        .await
        .unwrap();
    assert_eq!(incremental.kind, BackupKind::Incremental);

    fs::remove_file(root.join("2025/january.csv")).unwrap();

    let outcome = vault
        .restores()
        .perform_restore(RestoreOptions::new(incremental.id), "registrar")
        .await
        .unwrap();
    let RestoreOutcome::Applied(result) = outcome else {
        panic!("expected an applied restore");
    };
    assert!(result.success, "{:?}", result.validation_errors);
    assert_eq!(result.files_restored, 3);

    assert_eq!(fs::read(root.join("2025/january.csv")).unwrap(), vec![b'j'; 3072]);
    assert_eq!(
        fs::read(root.join("roster.csv")).unwrap(),
        b"edited after the full backup"
    );

    // nothing differs from the restored backup any more
    let changes = vault.backups().detector().detect_changes(Some(incremental.id)).unwrap();
    assert!(changes.is_empty());
}
