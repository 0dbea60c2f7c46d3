/*!
Drives the `baton` binary through real re-executions.
*/

use serde_json::Value;
use std::process::{Command, Output};
use tempfile::TempDir;

fn baton() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_baton"));
    command
        .env_remove("BATON_MAX_EXECUTION_TIME")
        .env_remove("BATON_STORAGE_KEY")
        .env_remove("BATON_THRESHOLD")
        .env_remove("RUST_LOG");
    command
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_probe_is_answered_verbatim() {
    let output = baton().arg("baton_check_exec").output().unwrap();

    assert!(output.status.success());
    assert_eq!(stdout(&output), "baton_check_exec_ok");
}

#[test]
fn test_run_without_ceiling_finishes_in_one_epoch() {
    let temp_dir = TempDir::new().unwrap();
    let state_path = temp_dir.path().join("single.state");

    let output = baton()
        .args(["run", "--items", "4", "--work-ms", "1"])
        .arg("--storage-key")
        .arg(&state_path)
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(stdout(&output).contains("Processed 4 items (sum 6) in 1 epoch(s)"));
    assert!(!state_path.exists());
}

#[test]
fn test_run_hands_off_until_done() {
    let temp_dir = TempDir::new().unwrap();
    let state_path = temp_dir.path().join("chain.state");
    let summary_path = temp_dir.path().join("out.json");

    // With a one second ceiling and threshold every epoch hands off after its
    // first item. `output` waits for every process holding the stdout pipe,
    // so the whole chain has finished when it returns.
    let output = baton()
        .args(["run", "--items", "6", "--work-ms", "50", "--ceiling", "1", "--threshold", "1"])
        .arg("--storage-key")
        .arg(&state_path)
        .arg("--output")
        .arg(&summary_path)
        .output()
        .unwrap();

    assert!(output.status.success());

    let summary: Value = serde_json::from_slice(&std::fs::read(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["items"], 6);
    assert_eq!(summary["sum"], 15);
    assert_eq!(summary["epochs"], 7);
    assert!(stdout(&output).contains("Processed 6 items (sum 15) in 7 epoch(s)"));
    assert!(!state_path.exists());
}

#[test]
fn test_verify_rejects_missing_file() {
    let temp_dir = TempDir::new().unwrap();

    let output = baton()
        .arg("verify")
        .arg(temp_dir.path().join("absent.state"))
        .output()
        .unwrap();

    assert!(!output.status.success());
}
