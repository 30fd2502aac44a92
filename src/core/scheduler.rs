//! # Scheduler Module / 调度器模块
//!
//! A fixed pool of workers drains a shared queue of planned instances.
//! Each worker runs one instance at a time in its own task, so a panic is
//! contained to that instance and reported as an internal error. Results
//! flow over a channel to a single aggregator, which produces the report.
//!
//! 固定数量的工作者从共享的计划实例队列中取出任务。
//! 每个工作者一次在独立的任务中运行一个实例，因此 panic 只会影响该实例，
//! 并被报告为内部错误。结果通过通道流向唯一的聚合器，由它生成报告。

use futures::future::{join_all, BoxFuture};
use futures::StreamExt;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::core::{
    config::RunConfig,
    execution::run_instance,
    models::{ErrorKind, TestInstance, Verdict},
    planner::ExecutionPlan,
    report::{Aggregator, ReportEntry, RunReport},
    shells::ShellRegistry,
};

/// Runs a single instance to completion. The scheduler only ever talks to
/// this trait, which keeps the pool independent of how instances execute.
///
/// 将单个实例运行至结束。调度器只与此 trait 交互，
/// 使工作池与实例的具体执行方式无关。
pub trait InstanceExecutor: Send + Sync + 'static {
    fn execute(&self, instance: TestInstance, cancel: CancellationToken)
    -> BoxFuture<'static, ReportEntry>;
}

/// Executes instances by spawning real shells.
/// 通过启动真实的 shell 来执行实例。
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    registry: Arc<ShellRegistry>,
    config: Arc<RunConfig>,
}

impl ShellExecutor {
    pub fn new(registry: Arc<ShellRegistry>, config: Arc<RunConfig>) -> Self {
        Self { registry, config }
    }
}

impl InstanceExecutor for ShellExecutor {
    fn execute(
        &self,
        instance: TestInstance,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ReportEntry> {
        let registry = Arc::clone(&self.registry);
        let config = Arc::clone(&self.config);
        Box::pin(async move { run_instance(instance, &registry, &config, cancel).await })
    }
}

/// Bounded worker pool.
/// 有界工作池。
pub struct Scheduler<E = ShellExecutor> {
    executor: Arc<E>,
    jobs: usize,
}

impl Scheduler<ShellExecutor> {
    /// A scheduler running real shells, sized by `config.jobs`.
    /// 运行真实 shell 的调度器，规模由 `config.jobs` 决定。
    pub fn new(registry: Arc<ShellRegistry>, config: Arc<RunConfig>) -> Self {
        let jobs = config.effective_jobs();
        Self::with_executor(ShellExecutor::new(registry, config), jobs)
    }
}

impl<E: InstanceExecutor> Scheduler<E> {
    pub fn with_executor(executor: E, jobs: usize) -> Self {
        Self {
            executor: Arc::new(executor),
            jobs: jobs.max(1),
        }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Runs every instance of `plan` and returns the report.
    ///
    /// When `cancel` fires, no further instance is dispatched and in-flight
    /// ones are asked to stop. Their entries, and those of instances that had
    /// already finished, are in the report; undispatched instances are not.
    /// The report counts as cancelled only if the token actually cut the run
    /// short, so a late Ctrl-C after the last instance changes nothing.
    ///
    /// 运行 `plan` 中的每个实例并返回报告。
    ///
    /// 当 `cancel` 触发时，不再分派新的实例，并请求正在运行的实例停止。
    /// 它们的条目以及已经完成的实例的条目都在报告中；未分派的实例则不在。
    /// 只有当取消确实中断了运行时报告才标记为已取消，
    /// 因此在最后一个实例之后的 Ctrl-C 不会改变结果。
    pub async fn run(&self, plan: ExecutionPlan, cancel: CancellationToken) -> RunReport {
        let planned = plan.len();
        let mut aggregator = Aggregator::new(planned);
        let queue = Arc::new(Mutex::new(VecDeque::from(plan.instances)));
        let (tx, rx) = mpsc::unbounded_channel();

        let workers: Vec<_> = (0..self.jobs.min(planned))
            .map(|_| {
                tokio::spawn(worker(
                    Arc::clone(&queue),
                    Arc::clone(&self.executor),
                    tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        drop(tx);

        let mut interrupted = false;
        let mut results = UnboundedReceiverStream::new(rx);
        while let Some(entry) = results.next().await {
            interrupted |= entry.verdict.error_kind() == Some(ErrorKind::Cancelled);
            aggregator.record(entry);
        }
        join_all(workers).await;

        // Workers only leave work behind when they saw the token.
        let undispatched = !queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        aggregator.finish(interrupted || undispatched)
    }
}

async fn worker<E: InstanceExecutor>(
    queue: Arc<Mutex<VecDeque<TestInstance>>>,
    executor: Arc<E>,
    results: mpsc::UnboundedSender<ReportEntry>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(instance) = next else {
            break;
        };

        let start = Instant::now();
        let fallback = instance.clone();
        let executor = Arc::clone(&executor);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { executor.execute(instance, token).await });

        let entry = match handle.await {
            Ok(entry) => entry,
            Err(e) => {
                let message = if e.is_panic() {
                    format!("worker panicked: {}", panic_message(e.into_panic()))
                } else {
                    e.to_string()
                };
                ReportEntry::without_output(
                    fallback,
                    Verdict::Error {
                        kind: ErrorKind::Internal,
                        message,
                    },
                    start.elapsed(),
                )
            }
        };

        if results.send(entry).is_err() {
            break;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
