//! # ShellMatrix Library / ShellMatrix 库
//!
//! This library provides the core functionality for ShellMatrix, a test
//! runner whose subjects are real shell invocations. A declared test is
//! expanded over shells and parameter bindings, every instance runs in its
//! own throwaway home directory, and the captured output is checked against
//! the test's expectations.
//!
//! 此库为 ShellMatrix 提供核心功能，这是一个以真实 shell 调用为测试对象的测试运行器。
//! 声明的测试会按 shell 和参数绑定展开，每个实例都在自己的临时主目录中运行，
//! 捕获的输出会与测试的预期进行比对。
//!
//! ## Modules / 模块
//!
//! - `core` - Data models, planning, execution, scheduling and evaluation
//! - `infra` - Process spawning and isolation directories
//! - `reporting` - Console rendering of run reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 数据模型、规划、执行、调度和评估
//! - `infra` - 进程启动和隔离目录
//! - `reporting` - 运行报告的控制台呈现
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::models;
pub use core::planner::plan_execution;
pub use core::report::RunReport;
pub use core::scheduler::Scheduler;
pub use core::shells::ShellRegistry;

/// Initializes the application's internationalization (i18n) based on the system locale.
///
/// This function detects the user's system locale and sets the appropriate
/// language for the application's user interface. It attempts to match the full
/// locale (e.g., "zh-CN"), then just the language code (e.g., "en"), and
/// finally falls back to the default language ("en").
pub fn init() {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    set_language(&locale);
}

/// Sets the output language, falling back the same way `init` does.
/// 设置输出语言，回退方式与 `init` 相同。
pub fn set_language(requested: &str) {
    rust_i18n::set_locale(resolve_language(requested));
}

/// Picks the available locale for `requested`: an exact match, then any
/// locale with the same language code (`zh` selects `zh-CN`), then `en`.
///
/// 为 `requested` 选择可用的语言区域：先精确匹配，再匹配语言代码相同的区域
/// （`zh` 会选择 `zh-CN`），最后回退到 `en`。
pub fn resolve_language(requested: &str) -> &'static str {
    let available_locales = rust_i18n::available_locales!();
    let language_code = |locale: &str| locale.split(['-', '_']).next().map(str::to_ascii_lowercase);

    available_locales
        .iter()
        .copied()
        .find(|locale| locale.eq_ignore_ascii_case(&requested.replace('_', "-")))
        .or_else(|| {
            let wanted = language_code(requested).filter(|code| !code.is_empty())?;
            available_locales
                .iter()
                .copied()
                .find(|locale| language_code(locale).as_deref() == Some(wanted.as_str()))
        })
        .unwrap_or("en")
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
