use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::cargo_bin("posturecheck").unwrap()
}

#[test]
fn config_show_defaults_when_file_missing() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    let out = cmd()
        .args(["--quiet", "config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["keepInBackground"], false);
    assert!(value["lastReportDate"].is_null());
}

#[test]
fn config_set_persists_to_disk() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("config.json");
    cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "set", "--keep-in-background", "true"])
        .assert()
        .success()
        .stdout(contains("\"keepInBackground\": true"));

    let saved: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(saved["keepInBackground"], true);
}

#[test]
fn config_set_without_values_fails() {
    let tmp = TempDir::new().unwrap();
    cmd()
        .arg("--config")
        .arg(tmp.path().join("config.json"))
        .args(["config", "set"])
        .assert()
        .failure()
        .stderr(contains("nothing to set"));
}

#[test]
fn status_never_reported() {
    let tmp = TempDir::new().unwrap();
    cmd()
        .arg("--config")
        .arg(tmp.path().join("config.json"))
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Last report: never"))
        .stdout(contains("No scan due."));
}

#[test]
fn status_reminds_after_a_month() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    fs::write(
        &path,
        r#"{"keepInBackground":false,"lastReportDate":"2020-01-01T00:00:00Z"}"#,
    )
    .unwrap();
    cmd()
        .arg("--config")
        .arg(&path)
        .arg("status")
        .assert()
        .success()
        .stdout(contains("more than a month"));
}

#[test]
fn corrupt_config_is_backed_up_by_cli() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    fs::write(&path, "{{{{").unwrap();
    cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("\"keepInBackground\": false"));

    let backups = fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".bak"))
        .count();
    assert_eq!(backups, 1);
}

#[test]
fn unknown_probe_is_rejected() {
    cmd().args(["check", "firewall"]).assert().failure();
}
