// Shared test helpers for integration tests
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use shellmatrix::config::RunConfig;
use shellmatrix::core::shells::{ShellDescriptor, ShellRegistry};
use shellmatrix::infra::fs::IsolationSpec;
use shellmatrix::models::ShellKind;

/// Whether `name` can be found on `PATH`. Tests that need a particular
/// shell return early when it is missing.
pub fn has_shell(name: &str) -> bool {
    which::which(name).is_ok()
}

/// The custom kind used for POSIX `sh` in tests.
pub fn sh() -> ShellKind {
    ShellKind::Custom("sh".into())
}

/// Built-ins plus a plain `sh`, which every POSIX host has.
pub fn registry() -> ShellRegistry {
    let mut registry = ShellRegistry::with_builtins();
    registry.register(sh(), ShellDescriptor::posix("sh"));
    registry
}

/// A quiet run configuration that keeps isolation trees under `base`.
pub fn run_config(base: &Path) -> RunConfig {
    RunConfig {
        jobs: 4,
        timeout: Duration::from_secs(10),
        kill_grace: Duration::from_millis(500),
        isolation: IsolationSpec {
            base_dir: Some(base.to_path_buf()),
            ..Default::default()
        },
        verbose_progress: false,
    }
}

/// Writes a suite file into `dir` and returns its path.
pub fn write_suite(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("ShellMatrix.toml");
    std::fs::write(&path, content).expect("Failed to write suite file");
    path
}
