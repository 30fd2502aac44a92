//! # Run Report Module / 运行报告模块
//!
//! Collects per-instance results into the immutable report of one run.
//! The `Aggregator` is the single writer; once `finish` is called the
//! resulting `RunReport` can only be read.
//!
//! 将每个实例的结果收集到一次运行的不可变报告中。
//! `Aggregator` 是唯一的写入者；调用 `finish` 之后，生成的 `RunReport` 只能被读取。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::models::{
    CapturedOutput, EnvironmentSnapshot, ShellKind, Status, TestInstance, Verdict,
};

/// The outcome of one instance, as handed to reporters.
/// 单个实例的结果，交给报告组件使用。
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub instance: TestInstance,
    pub verdict: Verdict,
    /// Raw capture. Empty when the process never ran.
    /// 原始捕获内容。进程从未运行时为空。
    pub output: CapturedOutput,
    pub snapshot: Option<EnvironmentSnapshot>,
    /// Wall-clock time spent on the whole instance, setup and teardown included.
    /// 整个实例花费的墙钟时间，包括准备和拆除。
    pub duration: Duration,
    /// Isolation directory left on disk because retention was requested.
    /// 因请求保留而留在磁盘上的隔离目录。
    pub retained_dir: Option<PathBuf>,
}

impl ReportEntry {
    /// An entry for an instance that ended before producing any output.
    pub fn without_output(instance: TestInstance, verdict: Verdict, duration: Duration) -> Self {
        Self {
            instance,
            verdict,
            output: CapturedOutput::default(),
            snapshot: None,
            duration,
            retained_dir: None,
        }
    }

    pub fn status(&self) -> Status {
        self.verdict.status()
    }
}

/// Verdict counts for one group of instances.
/// 一组实例的判定计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub timed_out: usize,
}

impl Counts {
    pub fn record(&mut self, status: Status) {
        self.total += 1;
        match status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Errored => self.errored += 1,
            Status::TimedOut => self.timed_out += 1,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Counts for the whole run, per shell and per test definition.
/// 整个运行的计数，按 shell 和测试定义分组。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub totals: Counts,
    pub by_shell: BTreeMap<ShellKind, Counts>,
    pub by_definition: BTreeMap<String, Counts>,
}

impl Summary {
    fn of(entries: &[ReportEntry]) -> Self {
        let mut summary = Summary::default();
        for entry in entries {
            let status = entry.status();
            summary.totals.record(status);
            summary
                .by_shell
                .entry(entry.instance.shell().clone())
                .or_default()
                .record(status);
            summary
                .by_definition
                .entry(entry.instance.definition.name.clone())
                .or_default()
                .record(status);
        }
        summary
    }
}

/// The immutable result of one engine run.
/// 一次引擎运行的不可变结果。
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    cancelled: bool,
    planned: usize,
    entries: Vec<ReportEntry>,
    summary: Summary,
}

impl RunReport {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Whether the run was cancelled before every planned instance was dispatched.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Number of instances in the plan.
    pub fn planned(&self) -> usize {
        self.planned
    }

    /// Entries in plan order.
    /// 按计划顺序排列的条目。
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Planned instances that were never dispatched.
    /// 已计划但从未被分派的实例数量。
    pub fn skipped(&self) -> usize {
        self.planned.saturating_sub(self.entries.len())
    }

    /// True when the run completed and every instance passed.
    /// 当运行完成且每个实例都通过时为 true。
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.skipped() == 0 && self.summary.totals.all_passed()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| !e.verdict.is_pass())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Single writer that turns a stream of entries into a `RunReport`.
/// 将条目流转换为 `RunReport` 的唯一写入者。
#[derive(Debug)]
pub struct Aggregator {
    started_at: DateTime<Utc>,
    planned: usize,
    entries: Vec<ReportEntry>,
}

impl Aggregator {
    pub fn new(planned: usize) -> Self {
        Self {
            started_at: Utc::now(),
            planned,
            entries: Vec::with_capacity(planned),
        }
    }

    pub fn record(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seals the report. Entries are sorted back into plan order.
    /// 封存报告。条目会被重新按计划顺序排序。
    pub fn finish(mut self, cancelled: bool) -> RunReport {
        self.entries.sort_by_key(|e| e.instance.seq);
        let summary = Summary::of(&self.entries);
        RunReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            cancelled,
            planned: self.planned,
            entries: self.entries,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ErrorKind, TestDefinition};
    use crate::core::planner::plan_execution;

    fn instances() -> Vec<TestInstance> {
        plan_execution(vec![
            TestDefinition::new("a", "true").with_shells([ShellKind::Bash, ShellKind::Zsh]),
            TestDefinition::new("b", "true").with_shells([ShellKind::Bash]),
        ])
        .unwrap()
        .instances
    }

    #[test]
    fn summary_groups_by_shell_and_definition() {
        let plan = instances();
        let mut agg = Aggregator::new(plan.len());
        let verdicts = [
            Verdict::Pass,
            Verdict::Timeout {
                after: Duration::from_secs(1),
            },
            Verdict::Error {
                kind: ErrorKind::Spawn,
                message: "boom".into(),
            },
        ];
        for (instance, verdict) in plan.into_iter().zip(verdicts).rev() {
            agg.record(ReportEntry::without_output(instance, verdict, Duration::ZERO));
        }

        let report = agg.finish(false);
        let seqs: Vec<_> = report.entries().iter().map(|e| e.instance.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        let summary = report.summary();
        assert_eq!(summary.totals.total, 3);
        assert_eq!(summary.totals.timed_out, 1);
        assert_eq!(summary.by_shell[&ShellKind::Bash].passed, 1);
        assert_eq!(summary.by_shell[&ShellKind::Bash].errored, 1);
        assert_eq!(summary.by_definition["a"].total, 2);
        assert!(!report.is_success());
    }

    #[test]
    fn undispatched_instances_count_as_skipped() {
        let plan = instances();
        let mut agg = Aggregator::new(plan.len());
        let first = plan.into_iter().next().unwrap();
        agg.record(ReportEntry::without_output(first, Verdict::Pass, Duration::ZERO));

        let report = agg.finish(true);
        assert_eq!(report.skipped(), 2);
        assert!(report.cancelled());
        assert!(!report.is_success());
        assert!(report.to_json_pretty().unwrap().contains("\"planned\": 3"));
    }
}
