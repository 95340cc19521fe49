use assert_cmd::Command;
use predicates::prelude::*;

use super::{BIN, Fixture};

#[test]
fn test_help() {
    Command::cargo_bin(BIN)
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("vm-test"))
        .stdout(predicate::str::contains("host-cmd"));
}

#[test]
fn test_missing_board_is_configuration_error() {
    Command::cargo_bin(BIN)
        .unwrap()
        .args(["--use-vm", "host-cmd", "--", "true"])
        .assert()
        .code(1);
}

#[test]
fn test_vm_and_device_conflict() {
    Command::cargo_bin(BIN)
        .unwrap()
        .args(["--board", "eve", "--use-vm", "--device", "dut", "host-cmd", "--", "true"])
        .assert()
        .code(1);
}

#[test]
fn test_bad_config_file() {
    let fixture = Fixture::new("");
    std::fs::write(fixture.config(), "src_root = [").unwrap();
    let output = fixture
        .cmd()
        .args(["host-cmd", "--", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("runner.toml"))
        .get_output()
        .clone();
    // One diagnostic, no log line repeating it.
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("runner.toml").count(), 1);
    assert!(stderr.starts_with("Error: "));
    assert!(fixture.tool_calls().is_empty());
}

#[test]
fn test_mismatched_output_dirs_never_start_the_tool() {
    let fixture = Fixture::new("");
    fixture
        .cmd()
        .args([
            "vm-test",
            "--test-exe",
            "base_unittests",
            "--path-to-outdir",
            "src/out/Release",
            "--test-launcher-summary-output",
            "/a/results.json",
            "--logs-dir",
            "/b",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("same directory"));
    assert!(fixture.tool_calls().is_empty());
    assert!(fixture.leftover_scripts().is_empty());
}

#[test]
fn test_sanity_rejects_pass_through_args() {
    let fixture = Fixture::new("");
    fixture
        .cmd()
        .args([
            "vm-test",
            "--test-exe",
            "cros_vm_sanity_test",
            "--path-to-outdir",
            "src/out/Release",
            "--",
            "--foo",
        ])
        .assert()
        .code(1);
    assert!(fixture.tool_calls().is_empty());
}

#[test]
fn test_host_cmd_requires_command() {
    let fixture = Fixture::new("");
    fixture
        .cmd()
        .arg("host-cmd")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Must specify command"));
}
