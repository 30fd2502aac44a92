//! # CLI Tests / 命令行测试
//!
//! Runs the `shellmatrix` binary against small suite files and checks its
//! exit status and output.
//!
//! 针对小型套件文件运行 `shellmatrix` 可执行文件，并检查其退出状态和输出。

#![cfg(unix)]

mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

fn suite(dir: &TempDir, tests: &str) -> std::path::PathBuf {
    let content = format!(
        r#"
[run]
jobs = 2
temp_root = "{}"

[shells.sh]
executable = "sh"

{tests}
"#,
        dir.path().join("isolation").display()
    );
    common::write_suite(dir.path(), &content)
}

fn shellmatrix() -> Command {
    Command::cargo_bin("shellmatrix").unwrap()
}

/// A passing suite exits with 0 and reports overall success.
/// 全部通过的套件以 0 退出，并报告整体成功。
#[test]
fn test_successful_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = suite(
        &dir,
        r#"
[[tests]]
name = "hello"
body = "echo hello"
shells = ["sh"]
expect = { stdout = { exact = "hello\n" } }
"#,
    );

    shellmatrix()
        .args(["--lang", "en", "run", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("hello [sh]"))
        .stdout(predicate::str::contains("ALL SHELL TESTS PASSED"));
}

/// A failing expectation makes the run fail and prints the mismatch.
/// 不满足的预期会使运行失败，并打印不匹配的内容。
#[test]
fn test_failing_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = suite(
        &dir,
        r#"
[[tests]]
name = "wrong-output"
body = "echo goodbye"
shells = ["sh"]
expect = { stdout = { contains = "hello" } }
"#,
    );

    shellmatrix()
        .args(["--lang", "en", "run", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("--- FAILURE DETAILS ---"))
        .stdout(predicate::str::contains("goodbye"))
        .stderr(predicate::str::contains("Shell tests failed."));
}

#[test]
fn test_json_report_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = suite(
        &dir,
        r#"
[[tests]]
name = "params"
body = "test -n \"$WHO\""
shells = ["sh"]
parameters = [[{ WHO = "a" }, { WHO = "b" }]]
"#,
    );
    let json_path = dir.path().join("report.json");

    shellmatrix()
        .args(["--lang", "en", "run", "--config"])
        .arg(&path)
        .arg("--json")
        .arg(&json_path)
        .assert()
        .success();

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(report["planned"], 2);
    assert_eq!(report["summary"]["totals"]["passed"], 2);
    assert_eq!(report["entries"][1]["instance"]["binding"]["WHO"], "b");
}

#[test]
fn test_missing_config_fails() {
    shellmatrix()
        .args(["--lang", "en", "run", "--config", "/no/such/suite.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read suite file"));
}

/// A test without shells is rejected before anything runs.
/// 没有 shell 的测试会在运行任何内容之前被拒绝。
#[test]
fn test_empty_matrix_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = suite(
        &dir,
        r#"
[[tests]]
name = "nowhere"
body = "true"
shells = []
"#,
    );

    shellmatrix()
        .args(["--lang", "en", "run", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty matrix"))
        .stdout(predicate::str::contains("[RUN]").not());
}

#[test]
fn test_unsupported_shell_is_an_error_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let path = suite(
        &dir,
        r#"
[shells.ghost]
executable = "definitely-not-a-real-shell-4711"

[[tests]]
name = "haunted"
body = "true"
shells = ["ghost", "sh"]
"#,
    );

    shellmatrix()
        .args(["--lang", "en", "run", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("unsupported shell"))
        .stdout(predicate::str::contains("sh: 1/1 passed"));
}

#[test]
fn test_shells_command_lists_builtins() {
    let dir = tempfile::tempdir().unwrap();
    shellmatrix()
        .current_dir(dir.path())
        .args(["--lang", "en", "shells"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bash"))
        .stdout(predicate::str::contains("fish"))
        .stdout(predicate::str::contains("tcsh"));
}

#[test]
fn test_no_subcommand_prints_help() {
    shellmatrix()
        .args(["--lang", "en"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}
