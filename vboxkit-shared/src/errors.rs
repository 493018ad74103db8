//! Error taxonomy for vboxkit.
//!
//! Every core component surfaces failures through [`VboxError`]. The variants map
//! one-to-one onto the failure classes callers need to tell apart:
//!
//! - `Process`: the external command could not be started at all
//! - `CommandFailed`: the command ran but exited non-zero (checked runs only)
//! - `Timeout`: a wall-clock deadline elapsed (command execution or polling)
//! - `ConfigUnavailable`: no descriptor file is known for the entity yet
//! - `Parse`: descriptor or tool output could not be interpreted

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout vboxkit.
pub type VboxResult<T> = Result<T, VboxError>;

#[derive(Error, Debug)]
pub enum VboxError {
    #[error("failed to start `{command}`: {source}")]
    Process {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("timed out after {:.1}s waiting for {what}", .elapsed.as_secs_f64())]
    Timeout { what: String, elapsed: Duration },

    #[error("descriptor unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VboxError {
    /// True for deadline expiry, whether from a command or a wait.
    pub fn is_timeout(&self) -> bool {
        matches!(self, VboxError::Timeout { .. })
    }

    /// True when the entity simply has no resolvable descriptor yet.
    pub fn is_config_unavailable(&self) -> bool {
        matches!(self, VboxError::ConfigUnavailable(_))
    }
}
