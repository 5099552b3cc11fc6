//! CLI integration tests

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

/// Build command for the pcbprobe binary (finds it in target/debug when run via cargo test).
fn pcbprobe(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("pcbprobe");
    cmd.arg("--dir").arg(dir).arg("--project").arg("board");
    cmd
}

/// Library fixtures (relative to workspace).
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("pcbprobe")
        .join("tests")
        .join("fixtures")
}

#[test]
fn test_cli_help() {
    let mut cmd = cargo_bin_cmd!("pcbprobe");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("probed PCB connections"));
}

#[test]
fn test_cli_version() {
    let mut cmd = cargo_bin_cmd!("pcbprobe");
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_shell_session_saves() {
    let dir = tempfile::tempdir().unwrap();
    pcbprobe(dir.path())
        .write_stdin("cadd U1 8 ? SOIC-8\nU1-1 R1-2\nname U1-1 VIN\nnets\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("VIN: 2 pins"))
        .stdout(predicate::str::contains("Saved 'board'"));

    assert!(dir.path().join("board_components.json").exists());
    assert!(dir.path().join("board_connections.json").exists());
    assert!(dir.path().join("board_nets.json").exists());
}

#[test]
fn test_cli_shell_survives_errors() {
    let dir = tempfile::tempdir().unwrap();
    pcbprobe(dir.path())
        .arg("shell")
        .write_stdin("R1-x C1-1\nfind R1-1\nR1-1 C1-1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Error:"))
        .stdout(predicate::str::contains("+ C1-1 <-> R1-1"));
}

#[test]
fn test_cli_run_then_nets_json() {
    let dir = tempfile::tempdir().unwrap();
    pcbprobe(dir.path()).args(["run", "R1-1", "C1-2"]).assert().success();
    pcbprobe(dir.path()).args(["run", "add", "C1-2", "GND"]).assert().success();
    pcbprobe(dir.path())
        .args(["run", "name", "GND", "GND"])
        .assert()
        .success();

    let output = pcbprobe(dir.path())
        .args(["nets", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["nets"].as_array().unwrap().len(), 1);
    assert_eq!(json["nets"][0]["name"], "GND");
    assert_eq!(json["nets"][0]["pins"].as_array().unwrap().len(), 3);
}

#[test]
fn test_cli_run_failure_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    pcbprobe(dir.path())
        .args(["run", "del", "R1-1", "R2-1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_cli_strict_components() {
    let dir = tempfile::tempdir().unwrap();
    pcbprobe(dir.path())
        .args(["--strict-components", "run", "R1-1", "C1-1"])
        .assert()
        .failure();

    pcbprobe(dir.path())
        .args(["--strict-components", "run", "cadd", "R1"])
        .assert()
        .success();
}

#[test]
fn test_cli_stats_and_check_on_legacy_project() {
    let mut cmd = cargo_bin_cmd!("pcbprobe");
    cmd.arg("--dir")
        .arg(fixtures_dir())
        .args(["--project", "legacy", "check"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Nets consistent: 5 nets"));

    let mut cmd = cargo_bin_cmd!("pcbprobe");
    cmd.arg("--dir")
        .arg(fixtures_dir())
        .args(["--project", "legacy", "stats"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Connections: 6"));
}

#[test]
fn test_cli_export_all() {
    let dir = tempfile::tempdir().unwrap();
    pcbprobe(dir.path()).args(["run", "R1-1", "C1-1"]).assert().success();
    pcbprobe(dir.path()).args(["export", "all"]).assert().success();

    for name in [
        "board_BOM.csv",
        "board_netlist.csv",
        "board_components.csv",
        "board.net",
        "board_named_nets.json",
    ] {
        assert!(dir.path().join(name).exists(), "{name} missing");
    }

    pcbprobe(dir.path())
        .args(["export", "gerber"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown export"));
}

#[test]
fn test_cli_bad_state_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("board_connections.json"), "{ nope").unwrap();
    pcbprobe(dir.path())
        .arg("stats")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("loading project 'board'"));
}
