//! External command execution.
//!
//! ## Architecture
//!
//! - **CommandLine**: opaque program + arguments, assembled by the caller
//! - **CommandRunner**: the seam every higher layer talks to
//! - **ProcessRunner**: real implementation (tokio child process, two reader
//!   tasks, optional deadline with process-group kill)
//!
//! Three entry points share one contract:
//!
//! - `run_captured`: run to completion, non-zero exit is a normal result
//! - `run_checked`: same, but non-zero exit becomes `CommandFailed` and an
//!   expired deadline becomes `Timeout`
//! - `run_streamed`: same as captured, with lines forwarded live to a sink

mod command;
mod options;
mod runner;

pub use command::{CommandLine, CommandResult, TIMEOUT_EXIT_CODE};
pub use options::{
    Channel, DEFAULT_TAIL_LINES, NullSink, OutputSink, OutputTail, RunOptions, StreamOptions,
    TracingSink,
};
pub use runner::ProcessRunner;

use std::time::Duration;

use async_trait::async_trait;
use vboxkit_shared::errors::{VboxError, VboxResult};

/// Executes external command lines.
///
/// Implementations must not retry; retry policy belongs to callers.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` with `options` and report its outcome.
    ///
    /// Fails only when the command cannot be started (`Process`) or its
    /// output cannot be collected. Non-zero exits and timeouts are reported
    /// in the returned [`CommandResult`].
    async fn run(&self, command: &CommandLine, options: RunOptions) -> VboxResult<CommandResult>;

    /// Run without a deadline or live output.
    async fn run_captured(&self, command: &CommandLine) -> VboxResult<CommandResult> {
        self.run(command, RunOptions::default()).await
    }

    /// Run and turn any unsuccessful outcome into an error.
    async fn run_checked(
        &self,
        command: &CommandLine,
        options: RunOptions,
    ) -> VboxResult<CommandResult> {
        let result = self.run(command, options.clone()).await?;
        check(result, options.timeout)
    }

    /// Run while forwarding output lines to `stream` as they arrive.
    async fn run_streamed(
        &self,
        command: &CommandLine,
        options: RunOptions,
        stream: StreamOptions,
    ) -> VboxResult<CommandResult> {
        self.run(command, options.stream(stream)).await
    }
}

/// Classify a finished result: timeout, non-zero exit, or success.
pub fn check(result: CommandResult, timeout: Option<Duration>) -> VboxResult<CommandResult> {
    if result.timed_out {
        return Err(VboxError::Timeout {
            what: result.command_line(),
            elapsed: timeout.unwrap_or_default(),
        });
    }
    if result.exit_code != 0 {
        return Err(VboxError::CommandFailed {
            command: result.command_line(),
            exit_code: result.exit_code,
            stderr: result.stderr.trim().to_string(),
        });
    }
    Ok(result)
}
