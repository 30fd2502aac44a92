//! # Configuration Module / 配置模块
//!
//! Loads a suite file (`ShellMatrix.toml`) and turns it into the three values
//! the engine consumes: the test definitions, the shell registry and the
//! run configuration.
//!
//! 加载套件文件（`ShellMatrix.toml`），并将其转换为引擎使用的三个值：
//! 测试定义、shell 注册表和运行配置。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::models::{ShellKind, TestDefinition};
use crate::core::shells::{ShellOverride, ShellRegistry};
use crate::infra::fs::{IsolationSpec, DEFAULT_PASSTHROUGH};
use crate::infra::t;

/// Default per-instance deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(2000);
/// Suite file looked up when `--config` is not given.
pub const DEFAULT_SUITE_FILE: &str = "ShellMatrix.toml";

/// Everything a run needs besides the definitions and the registry.
/// Passed by value to the scheduler; there is no global configuration.
///
/// 除定义和注册表之外运行所需的一切。
/// 以值的形式传递给调度器；不存在全局配置。
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum number of instances in flight. Zero is treated as one.
    /// 同时运行的最大实例数。零被视为一。
    pub jobs: usize,
    pub timeout: Duration,
    pub kill_grace: Duration,
    pub isolation: IsolationSpec,
    /// Print a line per instance as it starts and finishes.
    /// 在每个实例开始和结束时打印一行。
    pub verbose_progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            jobs: num_cpus::get(),
            timeout: DEFAULT_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
            isolation: IsolationSpec::default(),
            verbose_progress: false,
        }
    }
}

impl RunConfig {
    pub fn effective_jobs(&self) -> usize {
        self.jobs.max(1)
    }
}

/// The `[run]` table of a suite file.
/// 套件文件中的 `[run]` 表。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunSection {
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub kill_grace_millis: Option<u64>,
    /// Base directory for isolation trees; `~` and `$VAR` are expanded.
    /// 隔离目录树的基础目录；会展开 `~` 和 `$VAR`。
    pub temp_root: Option<String>,
    pub keep_dirs: bool,
    pub passthrough_env: Option<Vec<String>>,
    pub env: BTreeMap<String, String>,
}

/// A whole suite file.
/// 完整的套件文件。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuiteFile {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub run: RunSection,
    /// Overrides of built-in shells and registrations of custom ones.
    /// 对内置 shell 的覆盖以及自定义 shell 的注册。
    #[serde(default)]
    pub shells: BTreeMap<String, ShellOverride>,
    #[serde(default)]
    pub tests: Vec<TestDefinition>,
}

fn default_language() -> String {
    "en".to_string()
}

/// Values given on the command line. Each one, when present, wins over the
/// suite file.
///
/// 命令行给出的值。每个值在存在时都优先于套件文件。
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub keep_dirs: bool,
    pub temp_root: Option<PathBuf>,
}

/// Reads and parses a suite file.
/// 读取并解析套件文件。
pub fn load_suite(path: &Path) -> Result<SuiteFile> {
    let content = fs::read_to_string(path)
        .with_context(|| t!("config.read_failed", path = path.display()))?;
    parse_suite(&content).with_context(|| t!("config.parse_failed", path = path.display()))
}

/// Parses suite file content.
pub fn parse_suite(content: &str) -> Result<SuiteFile> {
    Ok(toml::from_str(content)?)
}

impl SuiteFile {
    /// Builds the registry: the built-ins, then every `[shells.<name>]` table
    /// applied in name order.
    ///
    /// 构建注册表：先是内置 shell，然后按名称顺序应用每个 `[shells.<name>]` 表。
    pub fn registry(&self) -> Result<ShellRegistry> {
        let mut registry = ShellRegistry::with_builtins();
        for (name, config) in &self.shells {
            registry
                .configure(ShellKind::from(name.as_str()), config.clone())
                .with_context(|| t!("config.shell_invalid", name = name))?;
        }
        Ok(registry)
    }

    /// Builds the run configuration, with command-line values taking precedence.
    /// 构建运行配置，命令行的值优先。
    pub fn run_config(&self, overrides: &RunOverrides) -> Result<RunConfig> {
        let run = &self.run;
        let defaults = RunConfig::default();

        let base_dir = match (&overrides.temp_root, &run.temp_root) {
            (Some(path), _) => Some(path.clone()),
            (None, Some(raw)) => {
                let expanded = shellexpand::full(raw)
                    .with_context(|| t!("config.temp_root_invalid", path = raw))?;
                Some(PathBuf::from(expanded.as_ref()))
            }
            (None, None) => None,
        };

        let passthrough = run.passthrough_env.clone().unwrap_or_else(|| {
            DEFAULT_PASSTHROUGH.iter().map(|s| s.to_string()).collect()
        });

        Ok(RunConfig {
            jobs: overrides.jobs.or(run.jobs).unwrap_or(defaults.jobs),
            timeout: overrides
                .timeout_secs
                .or(run.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            kill_grace: run
                .kill_grace_millis
                .map(Duration::from_millis)
                .unwrap_or(defaults.kill_grace),
            isolation: IsolationSpec {
                base_dir,
                passthrough,
                fixed_env: run.env.clone(),
                keep: overrides.keep_dirs || run.keep_dirs,
            },
            verbose_progress: defaults.verbose_progress,
        })
    }
}
