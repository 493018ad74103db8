//! Tool configuration.
//!
//! One immutable value, built once at start-up and shared with the runtime
//! and every machine facade.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vboxkit_shared::errors::{VboxError, VboxResult};

use crate::invoker::{CommandLine, RunOptions};
use crate::poller::PollOptions;

/// Environment variable overriding [`ToolConfig::manage_program`].
pub const MANAGE_PROGRAM_ENV: &str = "VBOXKIT_MANAGE";

/// Static configuration for talking to the management tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Management executable, resolved through `PATH` when not absolute.
    pub manage_program: String,
    /// Deadline applied to every management command; `None` waits forever.
    pub command_timeout_secs: Option<u64>,
    /// Kill the whole process group when a command times out.
    pub kill_descendants: bool,
    pub poll_interval_ms: u64,
    /// Stdout lines retained for live display during streamed runs.
    pub stream_tail_lines: usize,

    // Default budgets for the wait operations.
    pub shutdown_timeout_secs: u64,
    pub network_timeout_secs: u64,
    pub login_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            manage_program: "vboxmanage".to_string(),
            command_timeout_secs: None,
            kill_descendants: true,
            poll_interval_ms: 1000,
            stream_tail_lines: crate::invoker::DEFAULT_TAIL_LINES,
            shutdown_timeout_secs: 120,
            network_timeout_secs: 300,
            login_timeout_secs: 300,
        }
    }
}

impl ToolConfig {
    /// Read a JSON file; absent fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> VboxResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            VboxError::InvalidArgument(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| VboxError::Parse(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, with the program taken from `VBOXKIT_MANAGE` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(program) = std::env::var(MANAGE_PROGRAM_ENV)
            && !program.trim().is_empty()
        {
            config.manage_program = program.trim().to_string();
        }
        config
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.manage_program = program.into();
        self
    }

    fn validate(&self) -> VboxResult<()> {
        if self.manage_program.trim().is_empty() {
            return Err(VboxError::InvalidArgument(
                "manage_program must not be empty".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(VboxError::InvalidArgument(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// `<manage_program> <sub...>`
    pub fn command<I, S>(&self, sub: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandLine::new(&self.manage_program).args(sub)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Run options for a management command.
    pub fn run_options(&self) -> RunOptions {
        RunOptions::new()
            .timeout_opt(self.command_timeout())
            .kill_descendants(self.kill_descendants)
    }

    /// Poll options for a wait with the given budget.
    pub fn poll_options(&self, timeout: Duration) -> PollOptions {
        PollOptions::new(timeout).interval(self.poll_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ToolConfig::default();
        assert_eq!(config.manage_program, "vboxmanage");
        assert_eq!(config.command_timeout(), None);
        assert!(config.kill_descendants);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.stream_tail_lines, 20);
        assert_eq!(config.shutdown_timeout_secs, 120);
    }

    #[test]
    fn test_command_prefix() {
        let config = ToolConfig::default().with_program("/opt/vbox/VBoxManage");
        let cmd = config.command(["showvminfo", "vm1", "--machinereadable"]);
        assert_eq!(
            cmd.arguments(),
            vec!["/opt/vbox/VBoxManage", "showvminfo", "vm1", "--machinereadable"]
        );
    }

    #[test]
    fn test_load_partial_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vboxkit.json");
        std::fs::write(&path, r#"{"manage_program": "VBoxManage", "command_timeout_secs": 30}"#)
            .unwrap();

        let config = ToolConfig::load(&path).unwrap();
        assert_eq!(config.manage_program, "VBoxManage");
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.network_timeout_secs, 300);
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vboxkit.json");

        std::fs::write(&path, r#"{"poll_interval_ms": 0}"#).unwrap();
        assert!(matches!(
            ToolConfig::load(&path),
            Err(VboxError::InvalidArgument(_))
        ));

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(ToolConfig::load(&path), Err(VboxError::Parse(_))));
    }

    #[test]
    fn test_run_options_follow_config() {
        let config = ToolConfig {
            command_timeout_secs: Some(5),
            kill_descendants: false,
            ..ToolConfig::default()
        };
        let options = config.run_options();
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert!(!options.kill_descendants);
        assert!(options.stream.is_none());
    }
}
