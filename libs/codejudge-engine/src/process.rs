/// Child-process stage execution.
///
/// Every stage is started as the leader of a fresh process group. When the
/// stage finishes, or its deadline passes, the whole group is sent SIGKILL so
/// nothing the program forked survives the job.
///
/// The leader is only reaped after the group kill. Until then it stays a
/// zombie holding its pid, so the pgid cannot be recycled under us.

use crate::error::{EngineError, Result};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitid, Id, WaitPidFlag};
use nix::unistd::Pid;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to wait for pipe readers once the process group is gone
const READER_GRACE: Duration = Duration::from_secs(1);
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct StageLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Exited(i32),
    Signaled(i32),
    TimedOut,
}

/// Raw result of one child-process stage
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub exit: ExitState,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl StageOutput {
    pub fn succeeded(&self) -> bool {
        self.exit == ExitState::Exited(0)
    }

    pub fn timed_out(&self) -> bool {
        self.exit == ExitState::TimedOut
    }
}

/// Spawn `program`, feed it `stdin_path` (or nothing), and wait at most `limits.timeout`.
///
/// Spawn and wait failures are infrastructure errors; everything the program
/// itself does (nonzero exit, signals, hanging) is reported in `StageOutput`.
pub async fn run_stage(
    program: &str,
    args: &[String],
    cwd: &Path,
    stdin_path: Option<&Path>,
    limits: &StageLimits,
) -> Result<StageOutput> {
    let stdin = match stdin_path {
        Some(path) => Stdio::from(std::fs::File::open(path).map_err(|e| {
            EngineError::Infrastructure(format!("failed to open input {}: {}", path.display(), e))
        })?),
        None => Stdio::null(),
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| EngineError::Infrastructure(format!("failed to spawn {}: {}", program, e)))?;

    let start = Instant::now();
    let pgid = child.id();

    let mut stdout_reader = spawn_reader(child.stdout.take(), limits.max_output_bytes);
    let mut stderr_reader = spawn_reader(child.stderr.take(), limits.max_output_bytes);

    let exit = match tokio::time::timeout(limits.timeout, leader_exited(pgid)).await {
        Ok(Ok(())) => {
            // The leader is done; anything it left behind in the group goes too
            kill_group(pgid);
            let status = child.wait().await.map_err(|e| {
                EngineError::Infrastructure(format!("failed to reap {}: {}", program, e))
            })?;
            exit_state(status)
        }
        Ok(Err(e)) => {
            kill_group(pgid);
            return Err(EngineError::Infrastructure(format!(
                "failed to wait for {}: {}",
                program, e
            )));
        }
        Err(_) => {
            debug!(program = %program, timeout_ms = limits.timeout.as_millis() as u64, "Stage timed out, killing process group");
            kill_group(pgid);
            if let Err(e) = child.wait().await {
                warn!(program = %program, error = %e, "Failed to reap timed-out process");
            }
            ExitState::TimedOut
        }
    };

    let elapsed = start.elapsed();
    let stdout = collect(&mut stdout_reader).await;
    let stderr = collect(&mut stderr_reader).await;

    Ok(StageOutput {
        exit,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        elapsed,
    })
}

/// Resolve once the leader has exited, leaving it unreaped
async fn leader_exited(pid: Option<u32>) -> io::Result<()> {
    let Some(pid) = pid else {
        return Ok(());
    };
    let pid = Pid::from_raw(pid as i32);

    tokio::task::spawn_blocking(move || loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(io::Error::from(e)),
        }
    })
    .await
    .map_err(io::Error::other)?
}

fn exit_state(status: ExitStatus) -> ExitState {
    match (status.code(), status.signal()) {
        (Some(code), _) => ExitState::Exited(code),
        (None, Some(signal)) => ExitState::Signaled(signal),
        (None, None) => ExitState::Exited(-1),
    }
}

fn kill_group(pgid: Option<u32>) {
    let Some(pgid) = pgid else {
        return;
    };
    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid = pgid, error = %e, "Failed to kill process group"),
    }
}

fn spawn_reader<R>(pipe: Option<R>, limit: usize) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|pipe| tokio::spawn(read_capped(pipe, limit)))
}

/// Read the whole pipe, keeping at most `limit` bytes.
/// The rest is drained so the writer never blocks on a full pipe.
async fn read_capped<R>(mut pipe: R, limit: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                warn!(error = %e, "Error reading child output");
                break;
            }
        }
    }

    kept
}

async fn collect(reader: &mut Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(handle) = reader else {
        return Vec::new();
    };

    match tokio::time::timeout(READER_GRACE, &mut *handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            warn!(error = %e, "Output reader task failed");
            Vec::new()
        }
        Err(_) => {
            // Something outside the process group still holds the pipe open
            warn!("Output pipe still open after process exit, abandoning reader");
            handle.abort();
            Vec::new()
        }
    }
}
