//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command, which loads a suite file,
//! plans every instance, runs them on the worker pool and prints the report.
//!
//! 此模块实现 `run` 命令：加载套件文件，规划所有实例，
//! 在工作池上运行它们并打印报告。

use anyhow::{Context, Result};
use colored::*;
use std::{fs, path::PathBuf, sync::Arc};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::{load_suite, RunOverrides},
        planner::plan_execution,
        scheduler::Scheduler,
    },
    infra::t,
    reporting::console::{print_failure_details, print_summary},
};

/// Arguments of the `run` subcommand.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub keep_dirs: bool,
    pub temp_root: Option<PathBuf>,
    /// Where to write the report as JSON.
    pub json: Option<PathBuf>,
}

/// Executes the run command.
///
/// # Arguments
/// * `args` - Parsed command-line arguments
/// * `lang_forced` - Whether `--lang` was given; otherwise the suite's language is used
///
/// # Returns
/// `Ok` when every planned instance passed, an error otherwise
pub async fn execute(args: RunArgs, lang_forced: bool) -> Result<()> {
    let suite = load_suite(&args.config)?;
    if !lang_forced {
        crate::set_language(&suite.language);
    }

    println!(
        "{}",
        t!("run.loading_suite", path = args.config.display())
    );

    let registry = suite.registry()?;
    let overrides = RunOverrides {
        jobs: args.jobs,
        timeout_secs: args.timeout_secs,
        keep_dirs: args.keep_dirs,
        temp_root: args.temp_root.clone(),
    };
    let mut config = suite.run_config(&overrides)?;
    config.verbose_progress = true;

    let plan = plan_execution(suite.tests).with_context(|| t!("run.plan_failed").to_string())?;
    if plan.is_empty() {
        println!("{}", t!("run.no_tests").green());
        return Ok(());
    }

    println!(
        "{}",
        t!(
            "run.planned",
            instances = plan.len(),
            definitions = plan.definition_count,
            jobs = config.effective_jobs()
        )
        .bold()
    );

    let cancel = setup_signal_handler();
    let scheduler = Scheduler::new(Arc::new(registry), Arc::new(config));
    let report = scheduler.run(plan, cancel).await;

    print_summary(&report);

    if let Some(path) = &args.json {
        println!("\n{}", t!("run.writing_json", path = path.display()));
        let json = report.to_json_pretty().with_context(|| t!("run.json_failed").to_string())?;
        fs::write(path, json)
            .with_context(|| t!("run.json_write_failed", path = path.display()))?;
    }

    if report.is_success() {
        println!("\n{}", t!("run.all_passed").green().bold());
        Ok(())
    } else {
        print_failure_details(&report);
        if report.cancelled() {
            anyhow::bail!("{}", t!("run.cancelled"));
        }
        anyhow::bail!("{}", t!("run.failed"));
    }
}

/// Cancels the run on Ctrl-C. In-flight shells are terminated and no further
/// instance is started.
///
/// 在按下 Ctrl-C 时取消运行。正在运行的 shell 会被终止，且不会再启动新的实例。
fn setup_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            println!("\n{}", t!("run.shutdown_signal").yellow());
            token_clone.cancel();
        }
    });

    token
}
