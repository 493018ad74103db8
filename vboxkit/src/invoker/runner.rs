//! Child-process runner backed by tokio.
//!
//! Each invocation spawns one child with piped stdout/stderr and one reader
//! task per pipe. The readers drain independently, so a child writing heavily
//! to one pipe can never stall collection of the other.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::command::{CommandLine, CommandResult, TIMEOUT_EXIT_CODE};
use super::options::{Channel, RunOptions, StreamOptions};
use super::CommandRunner;
use crate::util::kill_process_group;
use vboxkit_shared::errors::{VboxError, VboxResult};

/// How long reader tasks may keep draining after a timed-out child was killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Reader handle; `None` once it has been awaited to completion.
type ReaderTask = Option<JoinHandle<io::Result<()>>>;

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandLine, options: RunOptions) -> VboxResult<CommandResult> {
        execute(command, options).await
    }
}

async fn execute(command: &CommandLine, options: RunOptions) -> VboxResult<CommandResult> {
    let mut cmd = command.to_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so a timeout can take down every descendant
    #[cfg(unix)]
    if options.kill_descendants {
        cmd.process_group(0);
    }

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| {
        tracing::error!(command = %command, error = %e, "Failed to spawn command");
        VboxError::Process {
            command: command.to_string(),
            source: e,
        }
    })?;

    let pid = child.id();
    tracing::debug!(command = %command, pid = ?pid, timeout = ?options.timeout, "Command spawned");

    let stdout_buf = Arc::new(Mutex::new(String::new()));
    let stderr_buf = Arc::new(Mutex::new(String::new()));
    let mut readers = vec![
        spawn_reader(
            child.stdout.take(),
            Channel::Stdout,
            options.stream.clone(),
            Arc::clone(&stdout_buf),
        ),
        spawn_reader(
            child.stderr.take(),
            Channel::Stderr,
            options.stream.clone(),
            Arc::clone(&stderr_buf),
        ),
    ];

    let finished = match options.timeout {
        Some(limit) => {
            tokio::time::timeout_at(started + limit, wait_all(&mut child, &mut readers))
                .await
                .ok()
        }
        None => Some(wait_all(&mut child, &mut readers).await),
    };

    let arguments = command.arguments();
    match finished {
        Some(status) => {
            let status = status?;
            let exit_code = exit_code_of(status);
            tracing::debug!(
                command = %command,
                exit_code,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Command finished"
            );
            Ok(CommandResult {
                arguments,
                exit_code,
                stdout: take_buffer(&stdout_buf),
                stderr: take_buffer(&stderr_buf),
                timed_out: false,
            })
        }
        None => {
            let elapsed = started.elapsed();
            tracing::warn!(
                command = %command,
                pid = ?pid,
                elapsed_ms = elapsed.as_millis() as u64,
                "Command exceeded its deadline, killing"
            );
            terminate(&mut child, pid, options.kill_descendants).await;
            drain_or_abort(&mut readers).await;

            let mut stderr = take_buffer(&stderr_buf);
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "command timed out after {:.1}s and was killed",
                elapsed.as_secs_f64()
            ));

            Ok(CommandResult {
                arguments,
                exit_code: TIMEOUT_EXIT_CODE,
                stdout: take_buffer(&stdout_buf),
                stderr,
                timed_out: true,
            })
        }
    }
}

/// Wait for the child to exit and both pipes to reach EOF.
///
/// Completed readers are cleared from their slot before the next await, so a
/// deadline firing mid-way never leaves a finished handle to be polled again.
async fn wait_all(child: &mut Child, readers: &mut [ReaderTask]) -> VboxResult<ExitStatus> {
    let status = child.wait().await?;
    for slot in readers.iter_mut() {
        if let Some(reader) = slot.as_mut() {
            let joined = reader.await;
            *slot = None;
            joined.map_err(|e| VboxError::Internal(format!("output reader panicked: {}", e)))??;
        }
    }
    Ok(status)
}

/// Spawn a task that copies one pipe into `buf`, forwarding lines live.
///
/// Bytes are appended verbatim (line endings included) so captured output
/// matches what the child wrote.
fn spawn_reader(
    stream: Option<impl AsyncRead + Unpin + Send + 'static>,
    channel: Channel,
    live: Option<StreamOptions>,
    buf: Arc<Mutex<String>>,
) -> ReaderTask {
    Some(tokio::spawn(async move {
        let Some(stream) = stream else {
            return Ok(());
        };
        let mut reader = BufReader::new(stream);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw).await? == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&raw);
            buf.lock().push_str(&text);

            if let Some(live) = &live {
                let line = text.trim_end_matches(['\r', '\n']);
                if channel == Channel::Stdout {
                    live.tail.push(line);
                }
                live.sink.line(channel, line);
            }
        }
        Ok(())
    }))
}

async fn terminate(child: &mut Child, pid: Option<u32>, kill_descendants: bool) {
    if kill_descendants && let Some(pid) = pid {
        if !kill_process_group(pid) {
            tracing::warn!(pid, "Failed to kill process group");
        }
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!(pid = ?pid, error = %e, "start_kill failed (child already gone?)");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(pid = ?pid, error = %e, "Failed to reap killed child");
    }
}

/// Give readers a short grace period, then abort whatever is still blocked.
///
/// A surviving grandchild may hold the pipe open forever when descendants
/// were not killed.
async fn drain_or_abort(readers: &mut [ReaderTask]) {
    let drained = tokio::time::timeout(DRAIN_GRACE, async {
        for slot in readers.iter_mut() {
            if let Some(reader) = slot.as_mut() {
                let _ = reader.await;
                *slot = None;
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::debug!("Output readers still blocked after kill, aborting");
        for reader in readers.iter().flatten() {
            reader.abort();
        }
    }
}

fn take_buffer(buf: &Mutex<String>) -> String {
    std::mem::take(&mut *buf.lock())
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
