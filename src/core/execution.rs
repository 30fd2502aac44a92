//! # Test Execution Engine Module / 测试执行引擎模块
//!
//! This module runs one test instance from start to finish:
//! shell resolution, isolation setup, execution (plus the optional
//! environment snapshot), teardown and evaluation, strictly in that order.
//! Whatever goes wrong along the way ends up in the instance's verdict.
//!
//! 此模块从头到尾运行单个测试实例：
//! 解析 shell、建立隔离、执行（以及可选的环境快照）、拆除和评估，严格按此顺序进行。
//! 过程中出现的任何问题都会体现在该实例的判定结果中。

use colored::*;
use regex::Captures;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::RunConfig,
        error::EngineError,
        evaluation::evaluate,
        models::{EnvironmentSnapshot, Status, TestInstance, Verdict},
        planner::PLACEHOLDER,
        report::ReportEntry,
        shells::{ResolvedShell, ShellRegistry},
    },
    infra::{
        command::{self, CaptureOptions, ProcessRun, Termination},
        fs::{write_script, IsolationContext},
        t,
    },
};

/// Runs one instance and returns its report entry. Never fails: every error
/// is rendered as the entry's verdict.
///
/// # Arguments
/// * `instance` - The instance to run
/// * `registry` - Shell descriptors, shared read-only by all workers
/// * `config` - Run-wide limits and isolation settings
/// * `cancel` - Run-level cancellation; terminates the shell when triggered
///
/// 运行单个实例并返回其报告条目。从不失败：所有错误都会呈现为该条目的判定结果。
pub async fn run_instance(
    instance: TestInstance,
    registry: &ShellRegistry,
    config: &RunConfig,
    cancel: CancellationToken,
) -> ReportEntry {
    let start = Instant::now();

    if cancel.is_cancelled() {
        return ReportEntry::without_output(
            instance,
            EngineError::Cancelled.into_verdict(),
            start.elapsed(),
        );
    }

    if config.verbose_progress {
        println!(
            "{}",
            t!("run.instance_started", name = instance.display_name()).blue()
        );
    }

    let shell = match registry.resolve(instance.shell()) {
        Ok(shell) => shell,
        Err(e) => return finish(instance, e.into_verdict(), start, config),
    };

    let extra_env = if instance.definition.parameter_mode.exports_env() {
        instance.binding.clone()
    } else {
        Default::default()
    };
    let mut ctx = match IsolationContext::create(&config.isolation, &instance.path_label(), &extra_env) {
        Ok(ctx) => ctx,
        Err(e) => return finish(instance, e.into_verdict(), start, config),
    };
    ctx.set_var("SHELL", shell.program.to_string_lossy());

    let executed = execute_in(&instance, &shell, &ctx, config, &cancel).await;
    let teardown = ctx.teardown();

    let (mut entry_verdict, output, snapshot) = match executed {
        Ok((run, snapshot)) => {
            let verdict = match run.termination {
                Termination::Cancelled => EngineError::Cancelled.into_verdict(),
                Termination::TimedOut => EngineError::Timeout {
                    after: run.output.duration,
                }
                .into_verdict(),
                Termination::Exited(_) => {
                    evaluate(&instance.definition.expect, &run.output, snapshot.as_ref())
                }
            };
            (verdict, run.output, snapshot)
        }
        Err(e) => (e.into_verdict(), Default::default(), None),
    };

    let retained_dir = match teardown {
        Ok(retained) => retained,
        Err(e) => {
            if entry_verdict.is_pass() {
                entry_verdict = e.into_verdict();
            }
            None
        }
    };

    let mut entry = ReportEntry::without_output(instance, entry_verdict, start.elapsed());
    entry.output = output;
    entry.snapshot = snapshot;
    entry.retained_dir = retained_dir;
    report_progress(&entry, config);
    entry
}

fn finish(instance: TestInstance, verdict: Verdict, start: Instant, config: &RunConfig) -> ReportEntry {
    let entry = ReportEntry::without_output(instance, verdict, start.elapsed());
    report_progress(&entry, config);
    entry
}

/// Spawns the body inside `ctx`. When the test inspects its environment, the
/// shell's snapshot trailer is appended to the body so that the dump runs in
/// the same process after the body; the dump is then cut out of stdout and
/// parsed. A body that leaves the shell early (`exit`, `set -e`) never reaches
/// the trailer and yields no snapshot.
///
/// 在 `ctx` 中启动测试主体。如果测试需要检查环境，会在主体之后追加该 shell 的快照尾部代码，
/// 使环境导出在同一进程中、于主体之后运行；随后从 stdout 中截取并解析导出内容。
/// 提前退出 shell 的主体（`exit`、`set -e`）不会执行到尾部代码，因此没有快照。
async fn execute_in(
    instance: &TestInstance,
    shell: &ResolvedShell,
    ctx: &IsolationContext,
    config: &RunConfig,
    cancel: &CancellationToken,
) -> Result<(ProcessRun, Option<EnvironmentSnapshot>), EngineError> {
    let definition = &instance.definition;
    let mut body = render_body(instance, shell)?;

    let marker = definition.wants_env_snapshot().then(|| snapshot_marker(ctx));
    if let Some(marker) = &marker {
        body = format!(
            "{}\n{}\n",
            body.trim_end_matches(['\n', '\r']),
            shell.snapshot_trailer(marker)
        );
    }

    let args = if definition.is_script() {
        let script = ctx
            .root()
            .join(format!("script.{}", shell.descriptor.script_extension));
        write_script(&script, &body)?;
        shell.script_invocation(&script)
    } else {
        shell.command_invocation(body.trim_end_matches(['\n', '\r']))
    };

    let options = CaptureOptions {
        timeout: instance.timeout(config.timeout),
        kill_grace: config.kill_grace,
    };

    let mut run =
        command::spawn_and_capture(shell_command(shell, ctx, args), &options, cancel).await?;

    let Some(marker) = marker else {
        return Ok((run, None));
    };
    let dump = run
        .output
        .split_off_stdout(format!("\n{marker}\n").as_bytes());
    let snapshot = match (&run.termination, dump) {
        (Termination::Exited(_), Some(dump)) => {
            Some(EnvironmentSnapshot::parse(&String::from_utf8_lossy(&dump)))
        }
        _ => None,
    };

    Ok((run, snapshot))
}

/// A delimiter no body prints by accident: the isolation root's name is
/// unique among live contexts.
fn snapshot_marker(ctx: &IsolationContext) -> String {
    let unique = ctx
        .root()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let unique: String = unique
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("__SHELLMATRIX_ENV_{unique}__")
}

fn shell_command(
    shell: &ResolvedShell,
    ctx: &IsolationContext,
    args: Vec<std::ffi::OsString>,
) -> Command {
    let mut cmd = Command::new(&shell.program);
    cmd.args(args)
        .env_clear()
        .envs(ctx.env())
        .current_dir(ctx.work_dir());
    cmd
}

/// Replaces `{{name}}` placeholders with the binding's values, quoted for
/// the target shell. Bodies of tests that do not substitute are returned as is.
///
/// 将 `{{name}}` 占位符替换为绑定中的值，并按目标 shell 的规则加引号。
/// 不进行替换的测试主体按原样返回。
pub fn render_body(instance: &TestInstance, shell: &ResolvedShell) -> Result<String, EngineError> {
    let definition = &instance.definition;
    if !definition.parameter_mode.substitutes() {
        return Ok(definition.body.clone());
    }

    let mut failure: Option<String> = None;
    let rendered = PLACEHOLDER.replace_all(&definition.body, |caps: &Captures<'_>| {
        let name = &caps[1];
        let quoted = match instance.binding.get(name) {
            Some(value) => shell.quote(value),
            None => Err(format!("no value is bound to '{name}'")),
        };
        quoted.unwrap_or_else(|reason| {
            failure.get_or_insert(reason);
            String::new()
        })
    });

    match failure {
        Some(reason) => Err(EngineError::InvalidDefinition {
            definition: definition.name.clone(),
            reason,
        }),
        None => Ok(rendered.into_owned()),
    }
}

fn report_progress(entry: &ReportEntry, config: &RunConfig) {
    if !config.verbose_progress {
        return;
    }

    let name = entry.instance.display_name();
    let duration = format!("{:.2?}", entry.duration);
    let line = match entry.status() {
        Status::Passed => t!("run.instance_passed", name = name, duration = duration).green(),
        Status::Failed => t!("run.instance_failed", name = name, duration = duration).red(),
        Status::TimedOut => t!("run.instance_timed_out", name = name, duration = duration).red(),
        Status::Errored => t!("run.instance_errored", name = name, duration = duration).yellow(),
    };
    println!("{line}");
}
