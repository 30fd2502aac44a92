//! # Core Module / 核心模块
//!
//! This module contains the test execution engine of ShellMatrix:
//! data models, shell descriptors, matrix planning, per-instance execution,
//! scheduling, evaluation and the run report.
//!
//! 此模块包含 ShellMatrix 的测试执行引擎：
//! 数据模型、shell 描述符、矩阵规划、单实例执行、调度、评估以及运行报告。

pub mod config;
pub mod error;
pub mod evaluation;
pub mod execution;
pub mod models;
pub mod planner;
pub mod report;
pub mod scheduler;
pub mod shells;

// Re-exports
pub use error::EngineError;
pub use report::RunReport;
pub use scheduler::Scheduler;
