use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn rollcall(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rollcall").unwrap();
    cmd.env("ROLLCALL_DATA_DIR", data_dir)
        .env_remove("ROLLCALL_PASSPHRASE")
        .env("ROLLCALL_ACTOR", "tester");
    cmd
}

fn init_with_records(data_dir: &Path, records: &Path) {
    std::fs::write(records.join("roster.csv"), "id,name\n1,Ada\n2,Grace\n").unwrap();
    rollcall(data_dir)
        .arg("init")
        .arg("--root")
        .arg(format!("records={}", records.display()))
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialization complete!"));
}

#[test]
fn test_commands_refuse_an_uninitialized_vault() {
    let data = TempDir::new().unwrap();
    rollcall(data.path())
        .args(["backup", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn test_init_rejects_a_malformed_root() {
    let data = TempDir::new().unwrap();
    rollcall(data.path())
        .args(["init", "--root", "records"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Expected NAME=PATH"));
}

#[test]
fn test_config_lists_tracked_roots() {
    let data = TempDir::new().unwrap();
    let records = TempDir::new().unwrap();
    init_with_records(data.path(), records.path());

    rollcall(data.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("records = "))
        .stdout(predicate::str::contains("Encryption enabled: false"));
}

#[test]
fn test_full_backup_then_list_and_changes() {
    let data = TempDir::new().unwrap();
    let records = TempDir::new().unwrap();
    init_with_records(data.path(), records.path());

    rollcall(data.path())
        .args(["backup", "create", "--full", "--name", "nightly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup completed: nightly"));

    rollcall(data.path())
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("COMPLETED"))
        .stdout(predicate::str::contains("FULL"));

    rollcall(data.path())
        .args(["backup", "show", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nightly"));

    std::fs::write(records.path().join("absences.csv"), "id,day\n1,mon\n").unwrap();
    rollcall(data.path())
        .args(["backup", "changes", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("records/absences.csv"))
        .stdout(predicate::str::contains("records/roster.csv").not());
}

#[test]
fn test_schedule_create_and_list() {
    let data = TempDir::new().unwrap();
    let records = TempDir::new().unwrap();
    init_with_records(data.path(), records.path());

    rollcall(data.path())
        .args([
            "schedule", "create", "weekday-sync", "--frequency", "weekly", "--days", "mon,thu",
            "--at", "09:30",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created schedule 'weekday-sync'"));

    rollcall(data.path())
        .args(["schedule", "create", "weekday-sync"])
        .assert()
        .failure();

    rollcall(data.path())
        .args(["schedule", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("weekday-sync"));
}

#[test]
fn test_audit_records_the_actor() {
    let data = TempDir::new().unwrap();
    let records = TempDir::new().unwrap();
    init_with_records(data.path(), records.path());

    rollcall(data.path())
        .args(["schedule", "create", "nightly"])
        .assert()
        .success();

    rollcall(data.path())
        .args(["audit", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tester"));
}
