//! # Command Execution Module / 命令执行模块
//!
//! Spawns one shell process and captures everything it prints. stdout and
//! stderr are read by two concurrent pump tasks that forward each chunk to a
//! single collector, so the combined stream reflects the order in which the
//! bytes actually arrived. A deadline and a cancellation token can both cut
//! the process short; termination is graceful first and forceful after a
//! grace period, and it targets the whole process group.
//!
//! 启动一个 shell 进程并捕获它输出的所有内容。stdout 和 stderr
//! 由两个并发的读取任务读取，每个数据块都被转发给同一个收集器，
//! 因此合并流反映了字节实际到达的顺序。截止时间和取消令牌都可以提前终止进程；
//! 终止先是温和的，在宽限期后变为强制，并且针对整个进程组。

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::error::EngineError;
use crate::core::models::{CapturedOutput, StreamKind};

const READ_BUFFER_SIZE: usize = 8 * 1024;
#[cfg(unix)]
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Limits applied to one process.
/// 应用于单个进程的限制。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Wall-clock deadline measured from spawn.
    /// 从启动开始计算的墙钟截止时间。
    pub timeout: Duration,
    /// Time between the polite and the forceful termination signal. Also
    /// bounds how long the streams are drained after the process is gone.
    ///
    /// 温和终止信号与强制终止信号之间的时间。
    /// 同时限制进程结束后排空输出流的时间。
    pub kill_grace: Duration,
}

/// How the process came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// The captured output together with how the process ended.
#[derive(Debug, Clone)]
pub struct ProcessRun {
    pub output: CapturedOutput,
    pub termination: Termination,
}

impl ProcessRun {
    pub fn is_cancelled(&self) -> bool {
        self.termination == Termination::Cancelled
    }
}

type Chunk = (StreamKind, Duration, Vec<u8>);

enum Outcome {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Spawns `cmd` with stdin closed and both output streams piped, and waits
/// until it exits, times out or is cancelled. Everything the process printed
/// before it ended is returned, including on timeout and cancellation.
///
/// 以关闭的 stdin 和管道化的两个输出流启动 `cmd`，
/// 并等待它退出、超时或被取消。进程结束前打印的所有内容都会被返回，
/// 超时和取消的情况下也是如此。
pub async fn spawn_and_capture(
    mut cmd: Command,
    options: &CaptureOptions,
    cancel: &CancellationToken,
) -> Result<ProcessRun, EngineError> {
    let program = PathBuf::from(cmd.as_std().get_program());

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so that termination reaches every descendant.
    // 独立的进程组，使终止信号能到达所有子孙进程。
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|source| EngineError::Spawn { program, source })?;
    let start = Instant::now();
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::Internal("child stdout was not piped".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::Internal("child stderr was not piped".into()))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Chunk>();
    let stdout_pump = pump(stdout, StreamKind::Stdout, start, tx.clone());
    let stderr_pump = pump(stderr, StreamKind::Stderr, start, tx);
    let collector = tokio::spawn(async move {
        let mut output = CapturedOutput::default();
        while let Some((stream, offset, bytes)) = rx.recv().await {
            output.push(stream, offset, bytes);
        }
        output
    });

    let outcome = tokio::select! {
        status = child.wait() => Outcome::Exited(status),
        _ = tokio::time::sleep(options.timeout) => Outcome::TimedOut,
        _ = cancel.cancelled() => Outcome::Cancelled,
    };

    let (termination, status) = match outcome {
        Outcome::Exited(status) => {
            let status = status.map_err(|e| EngineError::io("waiting for the shell to exit", e))?;
            // Background jobs of the shell must not outlive the instance.
            // shell 的后台任务不得比实例存活得更久。
            reap_group(pid, options.kill_grace).await;
            (Termination::Exited(status), Some(status))
        }
        Outcome::TimedOut => (
            Termination::TimedOut,
            graceful_kill(&mut child, pid, options.kill_grace).await.ok(),
        ),
        Outcome::Cancelled => (
            Termination::Cancelled,
            graceful_kill(&mut child, pid, options.kill_grace).await.ok(),
        ),
    };
    let duration = start.elapsed();

    // Background jobs may keep the pipes open after the shell itself is gone.
    // 后台任务可能在 shell 本身结束后仍保持管道打开。
    let aborts = [stdout_pump.abort_handle(), stderr_pump.abort_handle()];
    let drained = tokio::time::timeout(
        options.kill_grace,
        futures::future::join(stdout_pump, stderr_pump),
    )
    .await;

    let read_result = match drained {
        Ok((out, err)) => joined(out).and(joined(err)),
        Err(_) => {
            kill_group(pid);
            for handle in &aborts {
                handle.abort();
            }
            Ok(())
        }
    };

    let mut output = collector
        .await
        .map_err(|e| EngineError::Internal(format!("output collector failed: {e}")))?;
    read_result?;

    output.duration = duration;
    output.timed_out = termination == Termination::TimedOut;
    if let Termination::Exited(status) = termination {
        output.exit_code = status.code();
        output.signal = exit_signal(&status);
    } else if let Some(status) = status {
        output.signal = exit_signal(&status);
    }

    Ok(ProcessRun {
        output,
        termination,
    })
}

fn pump<R>(
    mut reader: R,
    stream: StreamKind,
    start: Instant,
    tx: mpsc::UnboundedSender<Chunk>,
) -> JoinHandle<io::Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            if tx.send((stream, start.elapsed(), buf[..n].to_vec())).is_err() {
                return Ok(());
            }
        }
    })
}

fn joined(result: Result<io::Result<()>, tokio::task::JoinError>) -> Result<(), EngineError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(EngineError::io("reading shell output", e)),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(EngineError::Internal(format!("output reader failed: {e}"))),
    }
}

/// Sends SIGTERM to the process group, waits up to `grace`, then SIGKILLs
/// whatever is left and reaps the shell.
///
/// 向进程组发送 SIGTERM，最多等待 `grace`，然后对剩余进程发送 SIGKILL 并回收 shell。
#[cfg(unix)]
async fn graceful_kill(child: &mut Child, pid: Option<u32>, grace: Duration) -> io::Result<ExitStatus> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        let group = Pid::from_raw(pid as i32);
        let _ = killpg(group, Signal::SIGTERM);
        if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
            let _ = killpg(group, Signal::SIGKILL);
            return status;
        }
        let _ = killpg(group, Signal::SIGKILL);
    }
    // Reaped children report their cached status here.
    let _ = child.start_kill();
    child.wait().await
}

#[cfg(not(unix))]
async fn graceful_kill(child: &mut Child, _pid: Option<u32>, _grace: Duration) -> io::Result<ExitStatus> {
    let _ = child.start_kill();
    child.wait().await
}

/// Terminates whatever is left in the group of a shell that already exited:
/// SIGTERM, then SIGKILL once `grace` has passed. Returns at once when the
/// group is empty.
///
/// 终止已退出 shell 的进程组中剩余的进程：先发送 SIGTERM，`grace` 过后发送 SIGKILL。
/// 进程组为空时立即返回。
#[cfg(unix)]
async fn reap_group(pid: Option<u32>, grace: Duration) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    let group = Pid::from_raw(pid as i32);
    if killpg(group, Signal::SIGTERM).is_err() {
        return;
    }
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if killpg(group, None).is_err() {
            return;
        }
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }
    let _ = killpg(group, Signal::SIGKILL);
}

#[cfg(not(unix))]
async fn reap_group(_pid: Option<u32>, _grace: Duration) {}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
