//! Launching the agent binary and tearing it down again.
//!
//! [`spawn`] starts the process and hands back two halves: an [`AgentProcess`]
//! that owns the OS handle and the termination protocol, and [`AgentLines`], a
//! lazy stream over stdout. Stderr is collected in the background (bounded) so a
//! chatty agent can never block on a full pipe; it is logged once the process
//! has exited.
//!
//! On Unix the agent leads its own process group and both termination signals
//! go to the whole group, so tools the agent started die with it.

use crate::codec::AgentLineCodec;
use crate::error::{GatewayError, Result};
use std::{
    path::Path,
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::{
    io::AsyncReadExt,
    process::{Child, ChildStderr, ChildStdout, Command},
    task::JoinHandle,
};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

/// How long a process gets between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Characters of stderr included in the post-exit log line.
pub const STDERR_LOG_CHARS: usize = 500;

/// Upper bound on stderr bytes retained per process; the rest is discarded.
const STDERR_CAPTURE_BYTES: usize = 16 * 1024;

/// How long to wait for the stderr collector after exit (grandchildren may
/// still hold the pipe open).
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lazy, forward-only sequence of decoded stdout lines.
pub type AgentLines = FramedRead<ChildStdout, AgentLineCodec>;

/// Start `program args…` in `cwd` with the current environment.
///
/// Fails with [`GatewayError::Launch`] if the OS refuses to start the process.
pub fn spawn(
    program: &Path,
    args: &[String],
    cwd: &Path,
    max_line_bytes: usize,
) -> Result<(AgentProcess, AgentLines)> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Backstop only: the normal paths always reap explicitly.
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(GatewayError::Launch)?;

    let pid = child.id().ok_or_else(|| {
        GatewayError::Launch(std::io::Error::other(
            "process exited before its pid could be read",
        ))
    })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        GatewayError::Launch(std::io::Error::other("stdout pipe was not captured"))
    })?;
    let stderr = child.stderr.take().map(collect_stderr);

    info!(pid, program = %program.display(), "Agent subprocess started");

    let lines = FramedRead::new(stdout, AgentLineCodec::new(max_line_bytes));
    Ok((AgentProcess { child, pid, stderr }, lines))
}

fn collect_stderr(mut stderr: ChildStderr) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut kept = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let room = STDERR_CAPTURE_BYTES.saturating_sub(kept.len());
                    kept.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
        kept
    })
}

/// Exclusive owner of one agent OS process.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    pid: u32,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

impl AgentProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the process to exit on its own.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Graceful-then-forced shutdown.
    ///
    /// Sends SIGTERM to the process group, waits up to `grace`, then SIGKILLs
    /// the group. Always reaps the process before returning, so no zombie is
    /// left behind. Calling it on a process that already exited just returns
    /// the cached status.
    pub async fn terminate(&mut self, grace: Duration) -> Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        info!(pid = self.pid, "Sending SIGTERM to agent subprocess");
        self.signal_terminate();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!(
                    pid = self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Agent did not exit within grace period, force killing"
                );
                self.signal_kill();
                Ok(self.child.wait().await?)
            }
        }
    }

    /// The leader is not reaped yet (try_wait above), so its pid still names
    /// our process group.
    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> bool {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(self.pid as i32), signal) {
            Ok(()) => true,
            Err(e) => {
                debug!(pid = self.pid, "{:?} to process group failed: {}", signal, e);
                false
            }
        }
    }

    #[cfg(unix)]
    fn signal_terminate(&mut self) {
        self.signal_group(nix::sys::signal::Signal::SIGTERM);
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self) {
        let _ = self.child.start_kill();
    }

    fn signal_kill(&mut self) {
        #[cfg(unix)]
        if self.signal_group(nix::sys::signal::Signal::SIGKILL) {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            // Raced with a natural exit; the caller's wait picks up the status.
            debug!(pid = self.pid, "SIGKILL failed: {}", e);
        }
    }

    /// Log the exit status and whatever the agent wrote to stderr.
    ///
    /// Must be called after the process has exited.
    pub async fn finish(mut self, status: Option<ExitStatus>) {
        match status {
            Some(status) => info!(pid = self.pid, code = ?status.code(), "Agent subprocess finished"),
            None => info!(pid = self.pid, "Agent subprocess finished with unknown status"),
        }

        let Some(handle) = self.stderr.take() else {
            return;
        };
        let bytes = match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, handle).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                debug!(pid = self.pid, "stderr collector failed: {}", e);
                return;
            }
            Err(_) => {
                debug!(pid = self.pid, "stderr still open after exit, giving up on it");
                return;
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let text = text.trim();
        if !text.is_empty() {
            let excerpt: String = text.chars().take(STDERR_LOG_CHARS).collect();
            warn!(pid = self.pid, "Agent stderr: {}", excerpt);
        }
    }
}
