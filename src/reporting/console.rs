//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints a finished run report to the console: a summary table
//! per instance, counts per shell, and the details of every instance that
//! did not pass.
//!
//! 此模块将完成的运行报告打印到控制台：每个实例的摘要表、按 shell 的计数，
//! 以及每个未通过实例的详细信息。

use colored::*;

use crate::core::models::{Status, Verdict};
use crate::core::report::{ReportEntry, RunReport};
use crate::infra::t;

/// Prints a formatted summary of the report to the console.
///
/// # Output Format / 输出格式
/// ```text
/// --- Test Summary ---
///   - Passed     | greets [bash] {who=world}                 |     12.31ms
///   - Failed     | greets [fish] {who=world}                 |     20.05ms
///   - Timed Out  | sleeps [zsh]                              |       1.00s
///
///   bash: 1/1 passed
///   fish: 0/1 passed
/// ```
pub fn print_summary(report: &RunReport) {
    println!("\n{}", t!("summary.banner").bold());

    for entry in report.entries() {
        let status = status_label(entry.status());
        println!(
            "  - {:<12} | {:<44} | {:>10}",
            status,
            entry.instance.display_name(),
            format!("{:.2?}", entry.duration)
        );
    }

    let summary = report.summary();
    println!();
    for (shell, counts) in &summary.by_shell {
        let line = t!(
            "summary.shell_line",
            shell = shell,
            passed = counts.passed,
            total = counts.total
        );
        if counts.all_passed() {
            println!("  {}", line.green());
        } else {
            println!("  {}", line.red());
        }
    }

    let totals = summary.totals;
    println!(
        "\n{}",
        t!(
            "summary.totals",
            total = totals.total,
            passed = totals.passed,
            failed = totals.failed,
            errored = totals.errored,
            timed_out = totals.timed_out
        )
        .bold()
    );
    if report.skipped() > 0 {
        println!("{}", t!("summary.skipped", count = report.skipped()).yellow());
    }
}

fn status_label(status: Status) -> ColoredString {
    match status {
        Status::Passed => t!("status.passed").green(),
        Status::Failed => t!("status.failed").red(),
        Status::Errored => t!("status.errored").yellow(),
        Status::TimedOut => t!("status.timed_out").red(),
    }
}

/// Prints what went wrong for every instance that did not pass: the failed
/// predicates with their expected and actual values, or the error message,
/// followed by the captured output.
///
/// 打印每个未通过实例的问题：失败的断言及其预期值和实际值，或者错误消息，
/// 然后是捕获的输出。
pub fn print_failure_details(report: &RunReport) {
    let failures: Vec<&ReportEntry> = report.failures().collect();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("details.banner").red().bold());
    println!("{}", "-".repeat(80));

    for (i, entry) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}'",
            i + 1,
            failures.len(),
            status_label(entry.status()),
            entry.instance.display_name().cyan()
        );

        match &entry.verdict {
            Verdict::Fail { mismatches } => {
                for mismatch in mismatches {
                    println!("  {} {}", "✗".red(), mismatch.predicate.to_string().bold());
                    println!("    {} {:?}", t!("details.expected").green(), mismatch.expected);
                    println!("    {} {:?}", t!("details.actual").red(), mismatch.actual);
                }
            }
            Verdict::Error { kind, message } => {
                println!("  {} ({kind}): {message}", t!("details.error").yellow());
            }
            Verdict::Timeout { after } => {
                println!("  {}", t!("details.timeout", after = format!("{after:.2?}")).red());
            }
            Verdict::Pass => {}
        }

        if !entry.output.combined.is_empty() {
            println!("\n--- {} ---\n", t!("details.output").yellow());
            println!("{}", entry.output.combined_str().trim_end());
        }
        if let Some(dir) = &entry.retained_dir {
            println!("\n{}", t!("details.retained", path = dir.display()).dimmed());
        }
        println!("\n{}", "-".repeat(80));
    }
}
