//! End-to-end tests of the kiln binary

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn kiln_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("CC")
        .env_remove("LD")
        .env_remove("KILN_JOBS")
        .env_remove("KILN_INCREMENTAL")
        .env_remove("KILN_PROFILE")
        .env_remove("KILN_JSON");
    cmd
}

/// A project whose compiler does not exist
fn broken_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("kiln.toml"),
        "[toolchain]\ncc = \"kiln-test-no-such-cc\"\n",
    )
    .unwrap();
    let src = temp.path().join("kernel/src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("kmain.c"), "void kmain(void) {}\n").unwrap();
    temp
}

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    kiln_cmd(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("clean"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_init_creates_project_files() {
    let temp = TempDir::new().unwrap();
    kiln_cmd(temp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("kiln.toml"));

    assert!(temp.path().join("kiln.toml").is_file());
    assert!(temp
        .path()
        .join("kernel/linker-scripts/x86_64.lds")
        .is_file());

    kiln_cmd(temp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn test_history_empty() {
    let temp = TempDir::new().unwrap();
    kiln_cmd(temp.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No builds recorded yet"));
}

#[test]
fn test_history_json_empty() {
    let temp = TempDir::new().unwrap();
    let output = kiln_cmd(temp.path())
        .args(["history", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records, serde_json::json!([]));
}

#[test]
fn test_failed_build_exits_nonzero_with_stage() {
    let temp = broken_project();
    kiln_cmd(temp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("compile stage failed"))
        .stderr(predicate::str::contains("kiln-test-no-such-cc"));

    kiln_cmd(temp.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("FAILED"))
        .stdout(predicate::str::contains("(compile stage)"));
}

#[test]
fn test_failed_build_json() {
    let temp = broken_project();
    let output = kiln_cmd(temp.path())
        .args(["build", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["success"], false);
    assert_eq!(summary["stage"], "compile");
}

#[test]
fn test_clean_deep_removes_state() {
    let temp = broken_project();
    kiln_cmd(temp.path()).arg("build").assert().failure();
    assert!(temp.path().join(".kiln/history.json").is_file());

    kiln_cmd(temp.path())
        .args(["clean", "--deep"])
        .assert()
        .success();
    assert!(!temp.path().join(".kiln").exists());
    assert!(temp.path().join("kernel/src/kmain.c").is_file());

    kiln_cmd(temp.path())
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to clean"));
}

#[test]
fn test_invalid_profile_rejected() {
    let temp = TempDir::new().unwrap();
    kiln_cmd(temp.path())
        .args(["build", "--profile", "turbo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid profile"));
}

#[test]
fn test_directory_flag() {
    let temp = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    kiln_cmd(other.path())
        .arg("-C")
        .arg(temp.path())
        .arg("init")
        .assert()
        .success();
    assert!(temp.path().join("kiln.toml").is_file());
    assert!(!other.path().join("kiln.toml").exists());
}
