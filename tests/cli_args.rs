//! Integration tests for the mes-fetch binary
//!
//! Runs the binary against JSON fixture files and checks its output lines.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_mes-fetch"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute mes-fetch")
}

/// Writes a fixture file and returns its path
fn fixture(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write fixture");
    path
}

/// Parses every stdout line as JSON
fn reports(output: &std::process::Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect()
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mes-fetch"), "Help should mention mes-fetch");
    assert!(stdout.contains("--cache-ttl-ms"), "Help should mention --cache-ttl-ms");
    assert!(stdout.contains("--refetch"), "Help should mention --refetch");
}

#[test]
fn test_missing_source_fails() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_zero_repeat_prints_error_and_exits() {
    let output = run_cli(&["inventory.json", "--repeat", "0"]);
    assert!(!output.status.success(), "Expected --repeat 0 to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("repeat"),
        "Should print error message about the repeat count: {}",
        stderr
    );
}

#[test]
fn test_envelope_file_is_unwrapped() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = fixture(
        &dir,
        "inventory.json",
        r#"{"success":true,"data":[{"id":1,"name":"Widget"}]}"#,
    );

    let output = run_cli(&[path.to_str().unwrap()]);

    assert!(output.status.success());
    let lines = reports(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["kind"], "mount");
    assert_eq!(lines[0]["state"]["data"][0]["name"], "Widget");
    assert_eq!(lines[0]["state"]["loading"], false);
    assert!(lines[0]["state"]["error"].is_null());
    assert_eq!(lines[0]["fetches"], 1);
}

#[test]
fn test_repeat_hits_cache_and_refetch_bypasses_it() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = fixture(&dir, "personnel.json", r#"[{"id":7,"name":"Operator"}]"#);

    let output = run_cli(&[path.to_str().unwrap(), "--repeat", "3", "--refetch"]);

    assert!(output.status.success());
    let lines = reports(&output);
    let fetches: Vec<u64> = lines.iter().map(|l| l["fetches"].as_u64().unwrap()).collect();
    assert_eq!(fetches, vec![1, 1, 1, 2]);
    assert_eq!(lines[3]["kind"], "refetch");
    assert_eq!(lines[3]["cycle"], 4);
}

#[test]
fn test_no_cache_fetches_every_time() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = fixture(&dir, "quality.json", r#"{"passRate":0.98}"#);

    let output = run_cli(&[path.to_str().unwrap(), "--repeat", "2", "--no-cache"]);

    assert!(output.status.success());
    let lines = reports(&output);
    assert_eq!(lines[1]["fetches"], 2);
    assert_eq!(lines[1]["state"]["data"]["passRate"], 0.98);
}

#[test]
fn test_failure_envelope_exits_with_error() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = fixture(
        &dir,
        "broken.json",
        r#"{"success":false,"error":{"message":"boom"}}"#,
    );

    let output = run_cli(&[path.to_str().unwrap()]);

    assert!(!output.status.success());
    let lines = reports(&output);
    assert_eq!(lines[0]["state"]["error"], "boom");
    assert!(lines[0]["state"]["data"].is_null());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("boom"), "stderr should carry the message: {}", stderr);
}

#[test]
fn test_missing_file_exits_with_error() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("does-not-exist.json");

    let output = run_cli(&[path.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does-not-exist.json"), "stderr: {}", stderr);
}
