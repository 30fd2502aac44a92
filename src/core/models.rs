//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures shared by every stage of the
//! engine: shell kinds, test definitions and their expectations, materialized
//! test instances, captured process output, environment snapshots and verdicts.
//!
//! 此模块定义了引擎各个阶段共享的核心数据结构：
//! shell 类型、测试定义及其预期、实例化的测试实例、
//! 捕获的进程输出、环境快照以及判定结果。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// A shell dialect a test can target.
/// The four built-in dialects have dedicated variants; any other name
/// becomes a `Custom` kind that must be registered through configuration.
///
/// 测试可以指定的 shell 方言。
/// 四种内置方言拥有专门的变体；其他任何名称都会成为 `Custom` 类型，
/// 必须通过配置进行注册。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
    Tcsh,
    Custom(String),
}

impl ShellKind {
    /// The built-in dialects, in the order they are registered.
    pub const BUILTIN: [ShellKind; 4] = [
        ShellKind::Bash,
        ShellKind::Zsh,
        ShellKind::Fish,
        ShellKind::Tcsh,
    ];

    /// Returns the canonical lowercase name of this kind.
    /// 返回此类型的规范小写名称。
    pub fn name(&self) -> &str {
        match self {
            ShellKind::Bash => "bash",
            ShellKind::Zsh => "zsh",
            ShellKind::Fish => "fish",
            ShellKind::Tcsh => "tcsh",
            ShellKind::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, ShellKind::Custom(_))
    }
}

impl From<&str> for ShellKind {
    fn from(name: &str) -> Self {
        match name {
            "bash" => ShellKind::Bash,
            "zsh" => ShellKind::Zsh,
            "fish" => ShellKind::Fish,
            "tcsh" => ShellKind::Tcsh,
            other => ShellKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for ShellKind {
    fn from(name: String) -> Self {
        ShellKind::from(name.as_str())
    }
}

impl From<ShellKind> for String {
    fn from(kind: ShellKind) -> Self {
        kind.name().to_string()
    }
}

impl FromStr for ShellKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ShellKind::from(s))
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One concrete assignment of parameter names to values.
/// 参数名到参数值的一次具体赋值。
pub type Binding = BTreeMap<String, String>;

/// One axis of parameterization: an ordered list of bindings.
/// 一个参数化维度：有序的绑定列表。
pub type ParameterSet = Vec<Binding>;

/// How a test consumes its parameter bindings.
/// 测试如何使用其参数绑定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterMode {
    /// Bindings are exported as environment variables.
    /// 绑定作为环境变量导出。
    #[default]
    Env,
    /// `{{name}}` placeholders in the body are replaced by quoted values.
    /// 主体中的 `{{name}}` 占位符被替换为加引号的值。
    Substitute,
    /// Both of the above.
    /// 以上两者。
    Both,
}

impl ParameterMode {
    pub fn exports_env(self) -> bool {
        matches!(self, ParameterMode::Env | ParameterMode::Both)
    }

    pub fn substitutes(self) -> bool {
        matches!(self, ParameterMode::Substitute | ParameterMode::Both)
    }
}

/// A compiled regular expression that round-trips through its source text.
/// 一个已编译的正则表达式，可以通过其源文本进行序列化往返。
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(serde::de::Error::custom)
    }
}

/// Predicate over a process exit code.
/// 针对进程退出码的断言。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCodeExpectation {
    /// Any exit code is accepted.
    Any,
    /// The exit code must equal the given value.
    Equals(i32),
    /// The process must exit with a non-zero code.
    NonZero,
}

impl Default for ExitCodeExpectation {
    fn default() -> Self {
        ExitCodeExpectation::Equals(0)
    }
}

/// Predicate over one captured output stream.
/// 针对单个捕获输出流的断言。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamExpectation {
    /// The stream is not inspected.
    /// 不检查该流。
    #[default]
    Any,
    /// The stream must equal the given text byte for byte.
    /// 该流必须与给定文本逐字节相等。
    Exact(String),
    /// The stream must contain the given text.
    /// 该流必须包含给定文本。
    Contains(String),
    /// The stream must match the given regular expression somewhere.
    /// 该流必须在某处匹配给定的正则表达式。
    Regex(Pattern),
}

/// Everything a test expects from one execution.
/// 测试对一次执行的全部预期。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Expectation {
    pub exit_code: ExitCodeExpectation,
    pub stdout: StreamExpectation,
    pub stderr: StreamExpectation,
    pub combined: StreamExpectation,
    /// Variables that must be present in the environment snapshot with
    /// exactly these values. Extra variables in the snapshot are ignored.
    ///
    /// 必须以完全相同的值出现在环境快照中的变量。
    /// 快照中额外的变量会被忽略。
    pub env: BTreeMap<String, String>,
}

/// A declared test, as handed over by whatever loaded the suite.
/// Immutable once loaded.
///
/// 已声明的测试，由加载测试套件的组件交付。
/// 加载后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Unique name of the test within its suite.
    /// 测试在其套件中的唯一名称。
    pub name: String,
    /// Script (multi-line) or inline command (single line) to run.
    /// 要运行的脚本（多行）或内联命令（单行）。
    pub body: String,
    /// Shells the test targets. Must not be empty.
    /// 测试所针对的 shell。不能为空。
    pub shells: Vec<ShellKind>,
    /// Parameter axes; the instances cover their cartesian product.
    /// 参数维度；实例覆盖它们的笛卡尔积。
    #[serde(default)]
    pub parameters: Vec<ParameterSet>,
    #[serde(default)]
    pub parameter_mode: ParameterMode,
    /// Capture an environment snapshot after the body ran.
    /// 在主体运行后捕获环境快照。
    #[serde(default)]
    pub inspect_env: bool,
    #[serde(default)]
    pub expect: Expectation,
    /// Overrides the run-wide timeout for this test.
    /// 为此测试覆盖整个运行的超时时间。
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl TestDefinition {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            shells: Vec::new(),
            parameters: Vec::new(),
            parameter_mode: ParameterMode::default(),
            inspect_env: false,
            expect: Expectation::default(),
            timeout_secs: None,
        }
    }

    #[must_use]
    pub fn with_shells(mut self, shells: impl IntoIterator<Item = ShellKind>) -> Self {
        self.shells = shells.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_parameter_set(mut self, set: ParameterSet) -> Self {
        self.parameters.push(set);
        self
    }

    #[must_use]
    pub fn with_parameter_mode(mut self, mode: ParameterMode) -> Self {
        self.parameter_mode = mode;
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn inspecting_env(mut self) -> Self {
        self.inspect_env = true;
        self
    }

    /// A body spanning more than one line runs as a script file.
    /// 跨越多行的主体以脚本文件方式运行。
    pub fn is_script(&self) -> bool {
        self.body.trim_end_matches(['\n', '\r']).contains('\n')
    }

    /// Whether an environment snapshot must be taken after the body ran.
    pub fn wants_env_snapshot(&self) -> bool {
        self.inspect_env || !self.expect.env.is_empty()
    }
}

/// Identity of a test instance: (definition index, shell, binding index).
/// 测试实例的标识：（定义索引、shell、绑定索引）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId {
    pub definition: usize,
    pub shell: ShellKind,
    pub binding: usize,
}

/// One concrete (definition, shell, binding) execution unit.
/// 一个具体的（定义、shell、绑定）执行单元。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestInstance {
    pub id: InstanceId,
    /// Position of this instance in the plan, used to keep reports stable.
    /// 此实例在执行计划中的位置，用于保持报告顺序稳定。
    pub seq: usize,
    pub definition: Arc<TestDefinition>,
    pub binding: Binding,
}

impl TestInstance {
    pub fn shell(&self) -> &ShellKind {
        &self.id.shell
    }

    /// Human-readable name, e.g. `greets [bash] {who=world}`.
    /// 人类可读的名称，例如 `greets [bash] {who=world}`。
    pub fn display_name(&self) -> String {
        let mut name = format!("{} [{}]", self.definition.name, self.id.shell);
        if !self.binding.is_empty() {
            let pairs = self
                .binding
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            name.push_str(&format!(" {{{pairs}}}"));
        }
        name
    }

    /// A filesystem-safe label, used when naming isolation directories.
    pub fn path_label(&self) -> String {
        format!(
            "{}_{}_{}",
            self.definition.name, self.id.shell, self.id.binding
        )
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
    }

    pub fn timeout(&self, default: Duration) -> Duration {
        self.definition
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

/// Which standard stream a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A block of bytes as it was read from the child, stamped with the time
/// since spawn at which the runner observed it.
///
/// 从子进程读取到的一段字节，并标记了运行器观察到它时距启动的时间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub offset: Duration,
    pub bytes: Vec<u8>,
}

/// Everything observed from one process: both streams, their arrival-order
/// interleaving, and how the process ended.
///
/// 从一个进程观察到的一切：两个输出流、它们按到达顺序的交错，以及进程如何结束。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// stdout and stderr interleaved in the order the bytes arrived.
    /// 按字节到达顺序交错的 stdout 和 stderr。
    pub combined: Vec<u8>,
    pub chunks: Vec<OutputChunk>,
    /// `None` when the process was killed by a signal or never exited.
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CapturedOutput {
    /// Appends a chunk to its own stream and to the combined stream.
    /// 将一个数据块追加到其自身的流以及合并流中。
    pub fn push(&mut self, stream: StreamKind, offset: Duration, bytes: Vec<u8>) {
        match stream {
            StreamKind::Stdout => self.stdout.extend_from_slice(&bytes),
            StreamKind::Stderr => self.stderr.extend_from_slice(&bytes),
        }
        self.combined.extend_from_slice(&bytes);
        self.chunks.push(OutputChunk {
            stream,
            offset,
            bytes,
        });
    }

    /// Removes the last `delimiter` from stdout together with everything
    /// after it, and returns those trailing bytes. The chunk timeline and the
    /// combined stream are cut at the same place; stderr is left alone.
    ///
    /// 从 stdout 中移除最后一个 `delimiter` 及其之后的所有内容，并返回这些尾部字节。
    /// 数据块时间线和合并流在同一位置截断；stderr 保持不变。
    pub fn split_off_stdout(&mut self, delimiter: &[u8]) -> Option<Vec<u8>> {
        if delimiter.is_empty() || self.stdout.len() < delimiter.len() {
            return None;
        }
        let cut = self
            .stdout
            .windows(delimiter.len())
            .rposition(|window| window == delimiter)?;
        let tail = self.stdout.split_off(cut)[delimiter.len()..].to_vec();

        let mut seen = 0;
        let mut chunks = Vec::with_capacity(self.chunks.len());
        for mut chunk in std::mem::take(&mut self.chunks) {
            if chunk.stream == StreamKind::Stdout {
                let start = seen;
                seen += chunk.bytes.len();
                if start >= cut {
                    continue;
                }
                chunk.bytes.truncate(cut - start);
            }
            chunks.push(chunk);
        }
        self.combined = chunks.iter().flat_map(|c| c.bytes.iter().copied()).collect();
        self.chunks = chunks;
        Some(tail)
    }

    pub fn stdout_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    pub fn combined_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.combined)
    }
}

/// Environment variables observed from inside a shell.
/// 从 shell 内部观察到的环境变量。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Parses `KEY=VALUE` lines as printed by `env`.
    /// A line without `=` continues the value of the previous variable,
    /// which is how multi-line values show up in that format.
    ///
    /// 解析 `env` 输出的 `KEY=VALUE` 行。
    /// 不含 `=` 的行是上一个变量值的延续，多行值在这种格式中就是这样呈现的。
    pub fn parse(text: &str) -> Self {
        let mut vars = BTreeMap::new();
        let mut last_key: Option<String> = None;

        for line in text.lines() {
            match line.split_once('=') {
                Some((key, value)) if is_env_name(key) => {
                    vars.insert(key.to_string(), value.to_string());
                    last_key = Some(key.to_string());
                }
                _ => {
                    if let Some(value) = last_key.as_ref().and_then(|k| vars.get_mut(k)) {
                        value.push('\n');
                        value.push_str(line);
                    }
                }
            }
        }

        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Returns true if `name` is usable as an environment variable name.
pub(crate) fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Classifies why an instance ended in `Verdict::Error`.
/// 对实例以 `Verdict::Error` 结束的原因进行分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedShell,
    IsolationSetup,
    Spawn,
    Io,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::UnsupportedShell => "unsupported shell",
            ErrorKind::IsolationSetup => "isolation setup",
            ErrorKind::Spawn => "spawn",
            ErrorKind::Io => "i/o",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// The observable a failed comparison was about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    ExitCode,
    Stdout,
    Stderr,
    Combined,
    Env(String),
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::ExitCode => f.write_str("exit code"),
            Predicate::Stdout => f.write_str("stdout"),
            Predicate::Stderr => f.write_str("stderr"),
            Predicate::Combined => f.write_str("combined output"),
            Predicate::Env(key) => write!(f, "env {key}"),
        }
    }
}

/// One failed comparison, with the expected and actual values rendered as text.
/// 一次失败的比较，预期值和实际值均以文本形式呈现。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub predicate: Predicate,
    pub expected: String,
    pub actual: String,
}

/// The outcome of one test instance.
/// 单个测试实例的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Verdict {
    /// Every predicate held.
    /// 所有断言均成立。
    Pass,
    /// At least one predicate did not hold.
    /// 至少有一个断言不成立。
    Fail { mismatches: Vec<Mismatch> },
    /// The instance could not be executed or evaluated.
    /// 该实例无法执行或评估。
    Error { kind: ErrorKind, message: String },
    /// The process outlived its deadline and was terminated.
    /// 进程超出了截止时间并被终止。
    Timeout { after: Duration },
}

/// Coarse status used for counting and coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
    Errored,
    TimedOut,
}

impl Verdict {
    pub fn status(&self) -> Status {
        match self {
            Verdict::Pass => Status::Passed,
            Verdict::Fail { .. } => Status::Failed,
            Verdict::Error { .. } => Status::Errored,
            Verdict::Timeout { .. } => Status::TimedOut,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Verdict::Timeout { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Verdict::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
