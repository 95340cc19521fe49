use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::process::Stdio;
use std::thread::sleep;
use std::time::{Duration, Instant};

use super::Fixture;

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_tast_success_writes_result_and_removes_script() {
    let fixture = Fixture::new("");
    let results = fixture.root().join("results.json");
    fixture
        .cmd()
        .args([
            "tast",
            "--suite-name",
            "chrome_all_tast_tests",
            "--path-to-outdir",
            "src/out/Release",
            "--test-launcher-summary-output",
        ])
        .arg(&results)
        .args(["-t", "ui.ChromeLogin", "--", "--gtest_filter=chrome_all_tast_tests", "--foo"])
        .assert()
        .success();

    let calls = fixture.tool_calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!(call.starts_with("--board eve --cache-dir "));
    assert!(call.contains("--device 127.0.0.1"));
    assert!(call.contains("--deploy --mount --build-dir out/Release"));
    assert!(call.contains("--files out/Release/device_script_"));
    assert!(!call.contains("--foo"));
    assert!(!call.contains("--gtest_filter"));

    assert!(fixture.leftover_scripts().is_empty());
    let json = read_json(&results);
    assert_eq!(json["per_iteration_data"][0]["chrome_all_tast_tests"][0]["status"], "PASS");
}

#[test]
fn test_failure_is_retried_and_reported() {
    let fixture = Fixture::new("[executor]\nretries = 1\n");
    let results = fixture.root().join("results.json");
    fixture
        .cmd()
        .env("FAKE_EXIT", "3")
        .args(["tast", "--suite-name", "tast_suite", "--path-to-outdir", "src/out/Release"])
        .arg("--test-launcher-summary-output")
        .arg(&results)
        .args(["--attr-expr", "(\"group:mainline\")"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Attempt #1"))
        .stderr(predicate::str::contains("Attempt #2"));

    assert_eq!(fixture.tool_calls().len(), 2);
    assert!(fixture.leftover_scripts().is_empty());
    let json = read_json(&results);
    assert_eq!(json["all_tests"], serde_json::json!(["tast_suite"]));
    assert_eq!(json["per_iteration_data"][0]["tast_suite"][0]["status"], "FAIL");
}

#[test]
fn test_sanity_retries_once_regardless_of_config() {
    let fixture = Fixture::new("[executor]\nretries = 5\n");
    fixture
        .cmd()
        .env("FAKE_EXIT", "1")
        .args(["vm-test", "--test-exe", "cros_vm_sanity_test", "--path-to-outdir", "src/out/Release"])
        .assert()
        .code(1);

    let calls = fixture.tool_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].ends_with(".sh"));
    assert!(fixture.leftover_scripts().is_empty());
}

#[test]
fn test_gtest_command_line() {
    let fixture = Fixture::new("");
    fixture
        .cmd()
        .env("GTEST_SHARD_INDEX", "1")
        .env("GTEST_TOTAL_SHARDS", "2")
        .args(["vm-test", "--test-exe", "base_unittests", "--path-to-outdir", "src/out/Release"])
        .assert()
        .success();

    let call = &fixture.tool_calls()[0];
    assert!(call.contains("--nostrip"));
    assert!(call.contains("--as-chronos"));
    assert!(call.contains("--remote-cmd --cwd out/Release"));
    assert!(!call.contains("--deploy"));
}

#[test]
fn test_host_cmd_runs_once() {
    let fixture = Fixture::new("[executor]\nretries = 3\n");
    fixture
        .cmd()
        .env("FAKE_EXIT", "4")
        .args(["host-cmd", "--", "./run_benchmark", "--story=all"])
        .assert()
        .code(4);

    let calls = fixture.tool_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].ends_with("--host-cmd -- ./run_benchmark --story=all"));
}

#[test]
fn test_missing_tool_exits_1() {
    let fixture = Fixture::new("");
    fs::remove_file(fixture.root().join("fake_run_test")).unwrap();
    fixture
        .cmd()
        .args(["vm-test", "--test-exe", "base_unittests", "--path-to-outdir", "src/out/Release"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to start"));
    assert!(fixture.leftover_scripts().is_empty());
}

#[test]
fn test_sigterm_kills_tool_children_only() {
    let fixture = Fixture::new("");
    let started = fixture.root().join("tool.log.started");
    let mut runner = std::process::Command::new(env!("CARGO_BIN_EXE_remote-test-runner"))
        .current_dir(fixture.root())
        .env("FAKE_LOG", fixture.log())
        .env("FAKE_HANG", "1")
        .env_remove("LLVM_PROFILE_FILE")
        .env_remove("FAKE_EXIT")
        .args(["--board", "eve", "--device", "127.0.0.1", "--config"])
        .arg(fixture.config())
        .args(["host-cmd", "--", "true"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    while !started.exists() {
        assert!(Instant::now() < deadline, "fake tool never started");
        sleep(Duration::from_millis(50));
    }
    kill(Pid::from_raw(runner.id() as i32), Signal::SIGTERM).unwrap();

    // The tool's own shutdown path runs once its child is gone.
    let status = runner.wait().unwrap();
    assert_eq!(status.code(), Some(0));
    assert_eq!(fixture.tool_calls().last().map(String::as_str), Some("shutdown"));
}

#[test]
fn test_sigint_exits_130_and_removes_script() {
    let fixture = Fixture::new("[executor]\nretries = 2\n");
    let started = fixture.root().join("tool.log.started");
    let mut runner = std::process::Command::new(env!("CARGO_BIN_EXE_remote-test-runner"))
        .current_dir(fixture.root())
        .env("FAKE_LOG", fixture.log())
        .env("FAKE_HANG", "1")
        .env_remove("LLVM_PROFILE_FILE")
        .env_remove("FAKE_EXIT")
        .args(["--board", "eve", "--device", "127.0.0.1", "--config"])
        .arg(fixture.config())
        .args(["tast", "--suite-name", "tast_suite", "--path-to-outdir", "src/out/Release"])
        .args(["-t", "ui.ChromeLogin"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    while !started.exists() {
        assert!(Instant::now() < deadline, "fake tool never started");
        sleep(Duration::from_millis(50));
    }
    assert_eq!(fixture.leftover_scripts().len(), 1);
    kill(Pid::from_raw(runner.id() as i32), Signal::SIGINT).unwrap();

    let status = runner.wait().unwrap();
    assert_eq!(status.code(), Some(130));
    assert!(fixture.leftover_scripts().is_empty());
    // No retry after the interrupt.
    assert_eq!(fixture.tool_calls().len(), 1);
}
