//! Smoke tests -- verify the binary runs and maps startup failures to exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn radload() -> Command {
    let mut cmd = Command::cargo_bin("radload").unwrap();
    cmd.env_remove("RADLOAD_CONFIG");
    cmd
}

#[test]
fn test_cli_help() {
    radload()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Concurrent load generator"));
}

#[test]
fn test_cli_version() {
    radload()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("radload"));
}

#[test]
fn test_missing_credentials_exit_code() {
    let tmp = TempDir::new().unwrap();
    radload()
        .args(["-f", "/nonexistent/radload.csv", "--backend", "true", "-d"])
        .arg(tmp.path().join("work"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("credential"));
}

#[test]
fn test_zero_workers_is_config_error() {
    radload().args(["-w", "0"]).assert().code(2);
}

#[test]
fn test_bad_duration_rejected_by_parser() {
    radload().args(["-t", "soon"]).assert().failure();
}

#[test]
fn test_unreadable_config_file() {
    radload()
        .args(["-c", "/nonexistent/radload.toml"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_backend_exit_code() {
    let tmp = TempDir::new().unwrap();
    let creds = tmp.path().join("creds.csv");
    std::fs::write(&creds, "alice,secret\n").unwrap();
    radload()
        .arg("-f")
        .arg(&creds)
        .arg("-d")
        .arg(tmp.path().join("work"))
        .args(["--backend", "radload-no-such-backend"])
        .assert()
        .code(6);
    assert!(!tmp.path().join("work").exists());
}

#[cfg(unix)]
#[test]
fn test_full_run_with_stub_backend() {
    let tmp = TempDir::new().unwrap();
    let creds = tmp.path().join("creds.csv");
    let log = tmp.path().join("attempts.log");
    std::fs::write(&creds, "alice,one\nbob,two\n").unwrap();

    radload()
        .arg("-f")
        .arg(&creds)
        .arg("-d")
        .arg(tmp.path().join("work"))
        .arg("-l")
        .arg(&log)
        .args(["-w", "2", "-n", "4", "-m", "3", "--cleanup", "--backend", "true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Requests started: 4"))
        .stdout(predicate::str::contains("Successes:        4"))
        .stdout(predicate::str::contains("max requests reached"));

    let lines = std::fs::read_to_string(&log).unwrap();
    assert_eq!(lines.lines().count(), 4);
    assert!(lines
        .lines()
        .all(|l| l.contains("succeeded authentication. Duration")));
    assert_eq!(std::fs::read_dir(tmp.path().join("work")).unwrap().count(), 0);
}

#[cfg(unix)]
#[test]
fn test_json_report_counts_failures() {
    let tmp = TempDir::new().unwrap();
    let creds = tmp.path().join("creds.csv");
    std::fs::write(&creds, "alice,one\n").unwrap();

    let output = radload()
        .arg("-f")
        .arg(&creds)
        .arg("-d")
        .arg(tmp.path().join("work"))
        .arg("-l")
        .arg(tmp.path().join("attempts.log"))
        .args(["-n", "3", "--json", "--backend", "false"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["stats"]["requests_started"], 3);
    assert_eq!(summary["stats"]["failures"], 3);
    assert_eq!(summary["stats"]["successes"], 0);
    assert_eq!(summary["stop_reason"], "request_limit");
}

#[cfg(unix)]
#[test]
fn test_json_report_without_log_file_keeps_stdout_clean() {
    let tmp = TempDir::new().unwrap();
    let creds = tmp.path().join("creds.csv");
    std::fs::write(&creds, "alice,one\n").unwrap();

    let output = radload()
        .arg("-f")
        .arg(&creds)
        .arg("-d")
        .arg(tmp.path().join("work"))
        .args(["-n", "2", "--json", "--backend", "true"])
        .env("RUST_LOG", "error")
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["stats"]["successes"], 2);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr
            .lines()
            .filter(|l| l.starts_with("[alice / -] succeeded authentication."))
            .count(),
        2
    );
}
