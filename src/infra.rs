//! # Infrastructure Module / 基础设施模块
//!
//! This module provides the OS plumbing of ShellMatrix:
//! process spawning with stream capture, and isolation directory trees.
//!
//! 此模块提供 ShellMatrix 的操作系统层支持：
//! 带输出流捕获的进程启动，以及隔离目录树。

pub mod command;
pub mod fs;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
