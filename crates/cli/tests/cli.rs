use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn init_creates_store_and_reports_blocking_count() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("gitup")
        .unwrap()
        .args(["--path", dir.path().to_str().unwrap(), "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));

    assert!(dir.path().join(".gitup").join("config.yaml").exists());
}

#[test]
fn status_on_uninitialized_project_fails() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("gitup")
        .unwrap()
        .args(["--path", dir.path().to_str().unwrap(), "status"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not initialized"));
}

#[test]
fn analyze_json_emits_valid_json() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::cargo_bin("gitup")
        .unwrap()
        .args(["--path", dir.path().to_str().unwrap(), "analyze", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(parsed.get("state").is_some());
}

#[test]
fn security_review_blocks_on_secret_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".env"), "API_KEY=abcdefghijklmnopqrst").unwrap();

    Command::cargo_bin("gitup")
        .unwrap()
        .args(["--path", dir.path().to_str().unwrap(), "init"])
        .assert()
        .failure();

    Command::cargo_bin("gitup")
        .unwrap()
        .args(["--path", dir.path().to_str().unwrap(), "security", "review", "--no-interactive"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("ViolationsDetected"));
}
