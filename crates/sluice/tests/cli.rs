//! End-to-end CLI tests for the `sluice` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

/// A command wired to isolated state directories via the environment.
fn sluice(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sluice").unwrap();
    cmd.current_dir(dir)
        .env("METADATA_DIR", dir.join("meta"))
        .env("WAL_FILE", dir.join("meta").join("wal.log"))
        .env("RELATIONAL_PATH", dir.join("relational.db"))
        .env("DOCUMENT_PATH", dir.join("docs"));
    cmd
}

fn write_jsonl_fixture(dir: &Path, records: usize) -> std::path::PathBuf {
    let path = dir.join("records.jsonl");
    let mut lines = String::new();
    for i in 0..records {
        lines.push_str(&format!(
            "{{\"username\":\"user{i}\",\"steps\":\"{}\",\"temp\":\"23.5\"}}\n",
            100 + i
        ));
    }
    fs::write(&path, lines).unwrap();
    path
}

#[test]
fn status_on_fresh_state_reports_zero() {
    let dir = tempfile::tempdir().unwrap();
    sluice(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("total records   0"))
        .stdout(predicate::str::contains("wal backlog     0"));
}

#[test]
fn reset_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    sluice(dir.path())
        .arg("reset")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("refusing to reset"));
}

#[test]
fn reset_with_confirm_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    sluice(dir.path())
        .args(["reset", "--confirm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pipeline state cleared"));
}

#[test]
fn ingest_from_file_then_status_and_decisions() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = write_jsonl_fixture(dir.path(), 60);

    sluice(dir.path())
        .args(["ingest", "--file"])
        .arg(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("ingested 60 records"));

    sluice(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("total records   60"))
        .stdout(predicate::str::contains("primary key     username"));

    sluice(dir.path())
        .arg("decisions")
        .assert()
        .success()
        .stdout(predicate::str::contains("username"))
        .stdout(predicate::str::contains("BIGINT"));
}

#[test]
fn ingest_requires_a_mode() {
    let dir = tempfile::tempdir().unwrap();
    sluice(dir.path()).arg("ingest").assert().code(2);
}

#[test]
fn missing_explicit_config_is_a_misconfiguration() {
    let dir = tempfile::tempdir().unwrap();
    sluice(dir.path())
        .args(["--config", "/definitely/missing.yaml", "status"])
        .assert()
        .code(2);
}

#[test]
fn invalid_batch_size_is_a_misconfiguration() {
    let dir = tempfile::tempdir().unwrap();
    sluice(dir.path())
        .env("BATCH_SIZE", "0")
        .arg("status")
        .assert()
        .code(2);
}

#[test]
fn status_supports_json_output() {
    let dir = tempfile::tempdir().unwrap();
    sluice(dir.path())
        .args(["--json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_records\": 0"));
}

#[test]
fn completion_generates_a_script() {
    let dir = tempfile::tempdir().unwrap();
    sluice(dir.path())
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sluice"));
}

#[test]
fn flush_with_nothing_buffered_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    sluice(dir.path())
        .arg("flush")
        .assert()
        .success()
        .stdout(predicate::str::contains("flushed 0 records"));
}
