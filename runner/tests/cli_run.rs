//! CLI tests for `tap-runner run` and `tap-runner init`.
//!
//! Spawns the binary against a temporary tutorial workspace whose test
//! command is a small shell script, and checks exit codes and the JSON
//! outcome line.

use std::process::{Command, Output};

use serde_json::Value;
use tap_runner::exit_codes;
use tap_runner::io::config::{CONFIG_RELATIVE_PATH, RunnerSettings, load_config};
use tap_runner::test_support::{TestWorkspace, runner_config, tutorial_with_config};

fn workspace(command: &str) -> TestWorkspace {
    let tutorial = tutorial_with_config(runner_config(command, "", None), &[("L1S1", None)]);
    TestWorkspace::new(&tutorial, &RunnerSettings::default()).expect("workspace")
}

fn run_step(ws: &TestWorkspace, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tap-runner"))
        .arg("--root")
        .arg(ws.path())
        .args(["run", "--level", "L1", "--step", "L1S1"])
        .args(extra)
        .output()
        .expect("tap-runner run")
}

fn last_outcome(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().last().expect("outcome line");
    serde_json::from_str(line).expect("outcome json")
}

#[test]
fn passing_tests_exit_ok() {
    let ws = workspace("printf 'TAP version 13\\n1..1\\nok 1 - adds\\n'");
    let output = run_step(&ws, &[]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let outcome = last_outcome(&output);
    assert_eq!(outcome["type"], "success");
    assert_eq!(outcome["position"]["stepId"], "L1S1");
}

#[test]
fn failing_assertion_exits_fail_with_title() {
    let ws = workspace("printf 'not ok 1 - adds\\n'; echo '1 failing' >&2; exit 1");
    let output = run_step(&ws, &[]);

    assert_eq!(output.status.code(), Some(exit_codes::FAIL));
    let outcome = last_outcome(&output);
    assert_eq!(outcome["type"], "fail");
    assert_eq!(outcome["fail"]["title"], "adds");
    assert_eq!(outcome["fail"]["summary"]["adds"], false);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("=== CodeRoad (Tests) ==="));
}

#[test]
fn crash_exits_error() {
    let ws = workspace("echo 'Error: Cannot find module' >&2; exit 1");
    let output = run_step(&ws, &[]);

    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert_eq!(last_outcome(&output)["type"], "error");
}

#[test]
fn subtask_probe_prints_summary() {
    let ws = workspace("printf 'ok 1 - first\\nnot ok 2 - second\\n'; exit 1");
    let output = run_step(&ws, &["--subtasks"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let outcome = last_outcome(&output);
    assert_eq!(outcome["type"], "subtask_summary");
    assert_eq!(outcome["summary"]["first"], true);
    assert_eq!(outcome["summary"]["second"], false);
}

#[test]
fn missing_tutorial_exits_invalid() {
    let ws = workspace("true");
    let output = run_step(&ws, &["--tutorial", "missing.json"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.json"), "stderr: {stderr}");
}

#[test]
fn init_writes_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = Command::new(env!("CARGO_BIN_EXE_tap-runner"))
        .arg("--root")
        .arg(temp.path())
        .arg("init")
        .status()
        .expect("tap-runner init");

    assert_eq!(status.code(), Some(exit_codes::OK));
    let settings = load_config(&temp.path().join(CONFIG_RELATIVE_PATH)).expect("load");
    assert_eq!(settings, RunnerSettings::default());
}
