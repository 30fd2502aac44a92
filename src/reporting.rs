//! # Reporting Module / 报告模块
//!
//! This module prints a finished `RunReport` to the console: a colored
//! summary table and the details of every instance that did not pass.
//!
//! 此模块将完成的 `RunReport` 打印到控制台：
//! 彩色的摘要表以及每个未通过实例的详细信息。

pub mod console;

// Re-export common reporting functions
pub use console::{print_failure_details, print_summary};
