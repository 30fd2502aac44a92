//! # Shell Capability Module / Shell 能力模块
//!
//! Describes, per shell dialect, how to run a script file, how to run an
//! inline command, how to dump the environment and how to quote a string.
//! Everything downstream of the registry is dialect-agnostic: it only ever
//! asks a `ResolvedShell` for an argument vector or a quoted value.
//!
//! 针对每种 shell 方言，描述如何运行脚本文件、如何运行内联命令、
//! 如何导出环境变量以及如何为字符串加引号。
//! 注册表下游的所有逻辑都与方言无关：它只会向 `ResolvedShell`
//! 请求参数向量或加引号的值。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::core::error::EngineError;
use crate::core::models::ShellKind;

/// Placeholder replaced by the script path in `script_args`.
pub const SCRIPT_PLACEHOLDER: &str = "{script}";
/// Placeholder replaced by the command text in `command_args` and
/// `snapshot_trailer`.
pub const COMMAND_PLACEHOLDER: &str = "{command}";
/// Placeholder replaced by the snapshot delimiter in `snapshot_trailer`.
pub const MARKER_PLACEHOLDER: &str = "{marker}";

const POSIX_TRAILER: &str = "__shellmatrix_status=$?\n\
                             printf '\\n%s\\n' '{marker}'\n\
                             {command}\n\
                             exit $__shellmatrix_status";
const FISH_TRAILER: &str = "set __shellmatrix_status $status\n\
                            printf '\\n%s\\n' '{marker}'\n\
                            {command}\n\
                            exit $__shellmatrix_status";
const CSH_TRAILER: &str = "set __shellmatrix_status = $status\n\
                           printf '\\n%s\\n' '{marker}'\n\
                           {command}\n\
                           exit $__shellmatrix_status";

/// How string values are quoted when injected into a shell body.
/// 将字符串值注入 shell 主体时的引用方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    /// POSIX single quoting (bash, zsh, sh).
    #[default]
    Posix,
    /// fish: single quotes with `\\` and `\'` escapes.
    Fish,
    /// csh/tcsh: single quotes, with `!` and newlines escaped.
    Csh,
}

impl QuoteStyle {
    /// Quotes `value` so the shell reads it back as exactly one word.
    /// Fails on NUL bytes, which no shell can carry in an argument.
    ///
    /// 为 `value` 加引号，使 shell 将其准确地读取为一个单词。
    /// 遇到 NUL 字节时失败，因为没有任何 shell 能在参数中携带它。
    pub fn quote(self, value: &str) -> Result<String, String> {
        if value.contains('\0') {
            return Err("value contains a NUL byte".to_string());
        }
        match self {
            QuoteStyle::Posix => shlex::try_quote(value)
                .map(|quoted| quoted.into_owned())
                .map_err(|e| e.to_string()),
            QuoteStyle::Fish => {
                let mut quoted = String::with_capacity(value.len() + 2);
                quoted.push('\'');
                for c in value.chars() {
                    match c {
                        '\\' => quoted.push_str("\\\\"),
                        '\'' => quoted.push_str("\\'"),
                        other => quoted.push(other),
                    }
                }
                quoted.push('\'');
                Ok(quoted)
            }
            QuoteStyle::Csh => {
                let mut quoted = String::with_capacity(value.len() + 2);
                quoted.push('\'');
                for c in value.chars() {
                    match c {
                        '\'' => quoted.push_str("'\\''"),
                        '!' => quoted.push_str("\\!"),
                        '\n' => quoted.push_str("\\\n"),
                        other => quoted.push(other),
                    }
                }
                quoted.push('\'');
                Ok(quoted)
            }
        }
    }
}

/// Static capability metadata for one shell dialect.
/// 单个 shell 方言的静态能力元数据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellDescriptor {
    /// Executable name (looked up on `PATH`) or absolute path.
    /// 可执行文件名（在 `PATH` 中查找）或绝对路径。
    pub executable: PathBuf,
    /// Arguments to run a script file non-interactively; contains `{script}`.
    /// 以非交互方式运行脚本文件的参数；包含 `{script}`。
    pub script_args: Vec<String>,
    /// Arguments to run an inline command; contains `{command}`.
    /// 运行内联命令的参数；包含 `{command}`。
    pub command_args: Vec<String>,
    /// Command that prints the environment as `KEY=VALUE` lines.
    /// 以 `KEY=VALUE` 行形式打印环境变量的命令。
    pub env_command: String,
    /// Shell code appended after the body when the environment is inspected.
    /// It must keep the body's exit status, print `{marker}` on a line of its
    /// own and then run `{command}`, all in the same shell process, so the
    /// dump sees what the body exported.
    ///
    /// 检查环境时追加在主体之后的 shell 代码。它必须保留主体的退出状态，
    /// 在单独的一行上打印 `{marker}`，然后运行 `{command}`，
    /// 且全部在同一个 shell 进程中执行，使导出的内容能看到主体所导出的变量。
    pub snapshot_trailer: String,
    pub quoting: QuoteStyle,
    /// Extension given to generated script files.
    pub script_extension: String,
}

impl ShellDescriptor {
    /// A descriptor for a POSIX-like shell that understands `-c`.
    pub fn posix(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            script_args: vec![SCRIPT_PLACEHOLDER.into()],
            command_args: vec!["-c".into(), COMMAND_PLACEHOLDER.into()],
            env_command: "env".into(),
            snapshot_trailer: POSIX_TRAILER.into(),
            quoting: QuoteStyle::Posix,
            script_extension: "sh".into(),
        }
    }

    /// The descriptor for a built-in kind, or `None` for custom kinds.
    /// 内置类型的描述符；对于自定义类型则返回 `None`。
    pub fn builtin(kind: &ShellKind) -> Option<Self> {
        let (executable, clean_flags, quoting, extension): (&str, &[&str], QuoteStyle, &str) =
            match kind {
                ShellKind::Bash => ("bash", &["--noprofile", "--norc"], QuoteStyle::Posix, "bash"),
                ShellKind::Zsh => ("zsh", &["-f"], QuoteStyle::Posix, "zsh"),
                ShellKind::Fish => ("fish", &["--no-config"], QuoteStyle::Fish, "fish"),
                ShellKind::Tcsh => ("tcsh", &["-f"], QuoteStyle::Csh, "tcsh"),
                ShellKind::Custom(_) => return None,
            };
        let trailer = match quoting {
            QuoteStyle::Posix => POSIX_TRAILER,
            QuoteStyle::Fish => FISH_TRAILER,
            QuoteStyle::Csh => CSH_TRAILER,
        };

        let flags = clean_flags.iter().map(|f| f.to_string());

        Some(Self {
            executable: PathBuf::from(executable),
            script_args: flags
                .clone()
                .chain([SCRIPT_PLACEHOLDER.to_string()])
                .collect(),
            command_args: flags
                .clone()
                .chain(["-c".to_string(), COMMAND_PLACEHOLDER.to_string()])
                .collect(),
            env_command: "env".into(),
            snapshot_trailer: trailer.into(),
            quoting,
            script_extension: extension.into(),
        })
    }
}

/// User configuration for one shell: either an override of a built-in
/// descriptor or the full description of a custom shell.
///
/// 单个 shell 的用户配置：可以是对内置描述符的覆盖，也可以是自定义 shell 的完整描述。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellOverride {
    pub executable: Option<PathBuf>,
    pub script_args: Option<Vec<String>>,
    pub command_args: Option<Vec<String>>,
    pub env_command: Option<String>,
    pub snapshot_trailer: Option<String>,
    pub quoting: Option<QuoteStyle>,
    pub script_extension: Option<String>,
}

impl ShellOverride {
    /// Applies this override on top of `base`. Custom shells have no base and
    /// must at least name their executable; the rest defaults to POSIX `-c`
    /// conventions.
    ///
    /// 在 `base` 之上应用此覆盖。自定义 shell 没有基础描述符，
    /// 至少必须指定其可执行文件；其余部分默认采用 POSIX `-c` 约定。
    pub fn apply(
        self,
        kind: &ShellKind,
        base: Option<ShellDescriptor>,
    ) -> Result<ShellDescriptor, EngineError> {
        let mut descriptor = match (base, &self.executable) {
            (Some(base), _) => base,
            (None, Some(executable)) => ShellDescriptor::posix(executable.clone()),
            (None, None) => {
                return Err(EngineError::UnsupportedShell {
                    shell: kind.clone(),
                    reason: "custom shell does not declare an executable".into(),
                });
            }
        };

        if let Some(executable) = self.executable {
            descriptor.executable = executable;
        }
        if let Some(args) = self.script_args {
            descriptor.script_args = args;
        }
        if let Some(args) = self.command_args {
            descriptor.command_args = args;
        }
        if let Some(command) = self.env_command {
            descriptor.env_command = command;
        }
        if let Some(trailer) = self.snapshot_trailer {
            descriptor.snapshot_trailer = trailer;
        }
        if let Some(quoting) = self.quoting {
            descriptor.quoting = quoting;
        }
        if let Some(extension) = self.script_extension {
            descriptor.script_extension = extension;
        }

        check_template(kind, "script_args", &descriptor.script_args, SCRIPT_PLACEHOLDER)?;
        check_template(kind, "command_args", &descriptor.command_args, COMMAND_PLACEHOLDER)?;
        let trailer = std::slice::from_ref(&descriptor.snapshot_trailer);
        check_template(kind, "snapshot_trailer", trailer, MARKER_PLACEHOLDER)?;
        check_template(kind, "snapshot_trailer", trailer, COMMAND_PLACEHOLDER)?;
        Ok(descriptor)
    }
}

fn check_template(
    kind: &ShellKind,
    field: &str,
    args: &[String],
    placeholder: &str,
) -> Result<(), EngineError> {
    if args.iter().any(|a| a.contains(placeholder)) {
        Ok(())
    } else {
        Err(EngineError::UnsupportedShell {
            shell: kind.clone(),
            reason: format!("`{field}` must contain the `{placeholder}` placeholder"),
        })
    }
}

/// Read-only mapping from shell kind to descriptor.
/// Built once at startup, then shared by reference with every worker.
///
/// 从 shell 类型到描述符的只读映射。
/// 在启动时构建一次，然后通过引用与每个工作者共享。
#[derive(Debug, Clone, Default)]
pub struct ShellRegistry {
    descriptors: BTreeMap<ShellKind, ShellDescriptor>,
}

impl ShellRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding the four built-in dialects.
    /// 包含四种内置方言的注册表。
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for kind in ShellKind::BUILTIN {
            if let Some(descriptor) = ShellDescriptor::builtin(&kind) {
                registry.register(kind, descriptor);
            }
        }
        registry
    }

    /// Registers (or replaces) the descriptor for `kind`.
    pub fn register(&mut self, kind: ShellKind, descriptor: ShellDescriptor) {
        self.descriptors.insert(kind, descriptor);
    }

    /// Applies a user override to an existing or new kind.
    /// 对已有或新的类型应用用户覆盖配置。
    pub fn configure(&mut self, kind: ShellKind, config: ShellOverride) -> Result<(), EngineError> {
        let base = self.descriptors.get(&kind).cloned();
        let descriptor = config.apply(&kind, base)?;
        self.register(kind, descriptor);
        Ok(())
    }

    pub fn descriptor(&self, kind: &ShellKind) -> Option<&ShellDescriptor> {
        self.descriptors.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ShellKind> {
        self.descriptors.keys()
    }

    /// Looks up the descriptor for `kind` and probes that its executable can
    /// actually be found and run on this system.
    ///
    /// 查找 `kind` 的描述符，并探测其可执行文件在当前系统上确实可以被找到并运行。
    pub fn resolve(&self, kind: &ShellKind) -> Result<ResolvedShell, EngineError> {
        let descriptor = self
            .descriptor(kind)
            .ok_or_else(|| EngineError::UnsupportedShell {
                shell: kind.clone(),
                reason: "no descriptor is registered for it".into(),
            })?;

        let program =
            which::which(&descriptor.executable).map_err(|e| EngineError::UnsupportedShell {
                shell: kind.clone(),
                reason: format!("'{}': {e}", descriptor.executable.display()),
            })?;

        Ok(ResolvedShell {
            kind: kind.clone(),
            program,
            descriptor: descriptor.clone(),
        })
    }
}

/// A descriptor whose executable has been located.
/// 已定位到可执行文件的描述符。
#[derive(Debug, Clone)]
pub struct ResolvedShell {
    pub kind: ShellKind,
    pub program: PathBuf,
    pub descriptor: ShellDescriptor,
}

impl ResolvedShell {
    pub fn script_invocation(&self, script: &Path) -> Vec<OsString> {
        self.descriptor
            .script_args
            .iter()
            .map(|arg| {
                if arg == SCRIPT_PLACEHOLDER {
                    script.as_os_str().to_owned()
                } else {
                    OsString::from(arg.replace(SCRIPT_PLACEHOLDER, &script.to_string_lossy()))
                }
            })
            .collect()
    }

    pub fn command_invocation(&self, command: &str) -> Vec<OsString> {
        fill(&self.descriptor.command_args, command)
    }

    /// The trailer that dumps the environment after the body, delimited by
    /// `marker`.
    /// 在主体之后导出环境变量的尾部代码，以 `marker` 作为分隔。
    pub fn snapshot_trailer(&self, marker: &str) -> String {
        self.descriptor
            .snapshot_trailer
            .replace(MARKER_PLACEHOLDER, marker)
            .replace(COMMAND_PLACEHOLDER, &self.descriptor.env_command)
    }

    pub fn quote(&self, value: &str) -> Result<String, String> {
        self.descriptor.quoting.quote(value)
    }
}

fn fill(template: &[String], command: &str) -> Vec<OsString> {
    template
        .iter()
        .map(|arg| OsString::from(arg.replace(COMMAND_PLACEHOLDER, command)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_quoting_round_trips_through_shlex() {
        let quoted = QuoteStyle::Posix.quote("it's a \"test\" $HOME").unwrap();
        let words = shlex::split(&quoted).unwrap();
        assert_eq!(words, vec!["it's a \"test\" $HOME".to_string()]);
    }

    #[test]
    fn fish_quoting_escapes_backslashes_and_quotes() {
        assert_eq!(QuoteStyle::Fish.quote(r"a\b'c").unwrap(), r"'a\\b\'c'");
    }

    #[test]
    fn csh_quoting_escapes_history_and_newlines() {
        assert_eq!(QuoteStyle::Csh.quote("hi!").unwrap(), r"'hi\!'");
        assert_eq!(QuoteStyle::Csh.quote("a\nb").unwrap(), "'a\\\nb'");
        assert_eq!(QuoteStyle::Csh.quote("don't").unwrap(), r"'don'\''t'");
    }

    #[test]
    fn quoting_rejects_nul() {
        assert!(QuoteStyle::Posix.quote("a\0b").is_err());
        assert!(QuoteStyle::Fish.quote("a\0b").is_err());
    }

    #[test]
    fn builtins_request_clean_sessions() {
        let bash = ShellDescriptor::builtin(&ShellKind::Bash).unwrap();
        assert_eq!(bash.script_args, vec!["--noprofile", "--norc", "{script}"]);
        assert_eq!(bash.command_args, vec!["--noprofile", "--norc", "-c", "{command}"]);

        let fish = ShellDescriptor::builtin(&ShellKind::Fish).unwrap();
        assert_eq!(fish.quoting, QuoteStyle::Fish);
        assert!(ShellDescriptor::builtin(&ShellKind::Custom("dash".into())).is_none());
    }

    #[test]
    fn custom_shell_requires_executable() {
        let mut registry = ShellRegistry::with_builtins();
        let kind = ShellKind::Custom("dash".into());
        assert!(registry.configure(kind.clone(), ShellOverride::default()).is_err());

        let config = ShellOverride {
            executable: Some(PathBuf::from("dash")),
            ..Default::default()
        };
        registry.configure(kind.clone(), config).unwrap();
        let descriptor = registry.descriptor(&kind).unwrap();
        assert_eq!(descriptor.command_args, vec!["-c", "{command}"]);
    }

    #[test]
    fn override_must_keep_placeholders() {
        let mut registry = ShellRegistry::with_builtins();
        let config = ShellOverride {
            command_args: Some(vec!["-c".into()]),
            ..Default::default()
        };
        assert!(registry.configure(ShellKind::Bash, config).is_err());
    }

    #[test]
    fn unregistered_kind_is_unsupported() {
        let registry = ShellRegistry::empty();
        let err = registry.resolve(&ShellKind::Bash).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedShell { .. }));
    }

    #[test]
    fn missing_binary_is_unsupported() {
        let mut registry = ShellRegistry::empty();
        registry.register(
            ShellKind::Custom("ghost".into()),
            ShellDescriptor::posix("definitely-not-a-real-shell-4711"),
        );
        let err = registry
            .resolve(&ShellKind::Custom("ghost".into()))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedShell { .. }));
    }

    #[test]
    fn invocations_fill_placeholders() {
        let resolved = ResolvedShell {
            kind: ShellKind::Bash,
            program: PathBuf::from("/bin/bash"),
            descriptor: ShellDescriptor::builtin(&ShellKind::Bash).unwrap(),
        };
        assert_eq!(
            resolved.command_invocation("echo hi"),
            vec!["--noprofile", "--norc", "-c", "echo hi"]
        );
        assert_eq!(
            resolved.script_invocation(Path::new("/tmp/x/script.bash")),
            vec!["--noprofile", "--norc", "/tmp/x/script.bash"]
        );
        let trailer = resolved.snapshot_trailer("__END__");
        assert!(trailer.starts_with("__shellmatrix_status=$?\n"));
        assert!(trailer.contains("printf '\\n%s\\n' '__END__'\nenv\n"));
        assert!(trailer.ends_with("exit $__shellmatrix_status"));
    }

    #[test]
    fn trailer_follows_the_dialect() {
        let fish = ShellDescriptor::builtin(&ShellKind::Fish).unwrap();
        assert!(fish.snapshot_trailer.starts_with("set __shellmatrix_status $status"));
        let tcsh = ShellDescriptor::builtin(&ShellKind::Tcsh).unwrap();
        assert!(tcsh.snapshot_trailer.starts_with("set __shellmatrix_status = $status"));
    }

    #[test]
    fn override_trailer_needs_marker_and_command() {
        let mut registry = ShellRegistry::with_builtins();
        let config = ShellOverride {
            snapshot_trailer: Some("{command}".into()),
            ..Default::default()
        };
        assert!(registry.configure(ShellKind::Zsh, config).is_err());
    }
}
