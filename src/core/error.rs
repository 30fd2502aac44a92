//! # Engine Error Module / 引擎错误模块
//!
//! The error taxonomy of the engine. Per-instance errors are converted into
//! that instance's verdict by the worker; only configuration-level errors
//! (`EmptyMatrix`, `InvalidDefinition`) ever leave the engine.
//!
//! 引擎的错误分类。每个实例的错误都由工作者转换为该实例的判定结果；
//! 只有配置级别的错误（`EmptyMatrix`、`InvalidDefinition`）才会离开引擎。

use std::error::Error as StdError;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::models::{ErrorKind, ShellKind, Verdict};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No descriptor is registered for the shell, or its binary cannot be found.
    /// 未为该 shell 注册描述符，或者找不到其可执行文件。
    #[error("shell '{shell}' is not supported on this system: {reason}")]
    UnsupportedShell { shell: ShellKind, reason: String },

    /// The per-instance temporary tree could not be created.
    /// 无法创建每个实例的临时目录树。
    #[error("failed to set up isolation directory under '{}'", .base.display())]
    IsolationSetup {
        base: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn '{}'", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error while {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {after:?}")]
    Timeout { after: Duration },

    /// The definition expands to no instances at all.
    /// 该定义展开后没有任何实例。
    #[error("test '{definition}' expands to an empty matrix: {reason}")]
    EmptyMatrix { definition: String, reason: String },

    #[error("test '{definition}' is invalid: {reason}")]
    InvalidDefinition { definition: String, reason: String },

    #[error("cancelled before the instance completed")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UnsupportedShell { .. } => ErrorKind::UnsupportedShell,
            EngineError::IsolationSetup { .. } => ErrorKind::IsolationSetup,
            EngineError::Spawn { .. } => ErrorKind::Spawn,
            EngineError::Io { .. } => ErrorKind::Io,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Timeout { .. }
            | EngineError::EmptyMatrix { .. }
            | EngineError::InvalidDefinition { .. }
            | EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error belongs to the configuration rather than a single run.
    /// 此错误是否属于配置错误，而非单次运行的错误。
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EngineError::EmptyMatrix { .. } | EngineError::InvalidDefinition { .. }
        )
    }

    /// Renders this error as the verdict of the instance it happened in.
    /// 将此错误呈现为其所在实例的判定结果。
    pub fn into_verdict(self) -> Verdict {
        match self {
            EngineError::Timeout { after } => Verdict::Timeout { after },
            other => Verdict::Error {
                kind: other.kind(),
                message: render_chain(&other),
            },
        }
    }
}

/// Joins an error and all of its sources into one line.
pub fn render_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
