//! # Configuration Unit Tests / 配置单元测试
//!
//! Tests for loading suite files from disk and turning them into a
//! registry and run configuration.
//!
//! 从磁盘加载套件文件并将其转换为注册表和运行配置的测试。

mod common;

use std::path::PathBuf;
use std::time::Duration;

use shellmatrix::config::{load_suite, RunOverrides, DEFAULT_KILL_GRACE, DEFAULT_TIMEOUT};
use shellmatrix::core::shells::QuoteStyle;
use shellmatrix::infra::fs::DEFAULT_PASSTHROUGH;
use shellmatrix::models::{ExitCodeExpectation, ShellKind, StreamExpectation};

#[test]
fn test_minimal_suite_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_suite(
        dir.path(),
        r#"
[[tests]]
name = "hello"
body = "echo hello"
shells = ["bash"]
"#,
    );

    let suite = load_suite(&path).unwrap();
    assert_eq!(suite.language, "en");
    let test = &suite.tests[0];
    assert_eq!(test.expect.exit_code, ExitCodeExpectation::Equals(0));
    assert_eq!(test.expect.stdout, StreamExpectation::Any);

    let config = suite.run_config(&RunOverrides::default()).unwrap();
    assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    assert_eq!(config.kill_grace, DEFAULT_KILL_GRACE);
    assert!(config.jobs >= 1);
    assert!(!config.isolation.keep);
    assert_eq!(config.isolation.passthrough.len(), DEFAULT_PASSTHROUGH.len());
    assert_eq!(config.isolation.base_dir, None);
}

#[test]
fn test_run_section_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_suite(
        dir.path(),
        r#"
[run]
jobs = 2
timeout_secs = 9
kill_grace_millis = 150
keep_dirs = true
passthrough_env = ["PATH"]
"#,
    );
    let suite = load_suite(&path).unwrap();

    let config = suite
        .run_config(&RunOverrides {
            timeout_secs: Some(1),
            temp_root: Some(PathBuf::from("/tmp/override")),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(config.jobs, 2);
    assert_eq!(config.timeout, Duration::from_secs(1));
    assert_eq!(config.kill_grace, Duration::from_millis(150));
    assert!(config.isolation.keep);
    assert_eq!(config.isolation.passthrough, vec!["PATH".to_string()]);
    assert_eq!(config.isolation.base_dir, Some(PathBuf::from("/tmp/override")));
}

#[test]
fn test_temp_root_is_expanded() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_suite(
        dir.path(),
        r#"
[run]
temp_root = "~/shellmatrix-tmp"
"#,
    );
    let suite = load_suite(&path).unwrap();
    let config = suite.run_config(&RunOverrides::default()).unwrap();
    let base = config.isolation.base_dir.unwrap();
    assert!(!base.to_string_lossy().starts_with('~'));
    assert!(base.ends_with("shellmatrix-tmp"));
}

#[test]
fn test_shell_overrides_apply_to_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_suite(
        dir.path(),
        r#"
[shells.bash]
executable = "/opt/bash5/bin/bash"

[shells.mksh]
executable = "mksh"
quoting = "posix"
script_extension = "ksh"
"#,
    );
    let registry = load_suite(&path).unwrap().registry().unwrap();

    let bash = registry.descriptor(&ShellKind::Bash).unwrap();
    assert_eq!(bash.executable, PathBuf::from("/opt/bash5/bin/bash"));
    assert!(bash.script_args.contains(&"--norc".to_string()));

    let mksh = registry.descriptor(&ShellKind::Custom("mksh".into())).unwrap();
    assert_eq!(mksh.quoting, QuoteStyle::Posix);
    assert_eq!(mksh.script_extension, "ksh");
}

#[test]
fn test_invalid_shell_override_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_suite(
        dir.path(),
        r#"
[shells.broken]
script_args = ["run"]
"#,
    );
    let err = load_suite(&path).unwrap().registry().unwrap_err();
    assert!(format!("{err:#}").contains("broken"));
}

#[test]
fn test_missing_file_is_an_error() {
    let err = load_suite(std::path::Path::new("/no/such/ShellMatrix.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("/no/such/ShellMatrix.toml"));
}

#[test]
fn test_malformed_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_suite(dir.path(), "[[tests]\nname = \"x\"\n");
    assert!(load_suite(&path).is_err());
}
