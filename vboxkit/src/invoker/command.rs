//! Command line and result types.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Exit code reported when a command is killed for exceeding its deadline.
///
/// Matches the convention of coreutils `timeout(1)`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Flags whose following argument is a credential.
const SECRET_FLAGS: &[&str] = &["--password"];

/// Replacement shown for masked values.
const MASK: &str = "***";

/// A fully-formed external command: program plus ordered arguments.
///
/// The invoker treats the arguments as opaque; building them is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    /// Values masked wherever they appear when the line is displayed.
    #[serde(skip)]
    secrets: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secrets: Vec::new(),
        }
    }

    /// Wrap an opaque command-line string for the platform shell.
    ///
    /// On unix this is `sh -c <text>`, on windows `cmd /C <text>`.
    pub fn shell(text: impl Into<String>) -> Self {
        #[cfg(windows)]
        let (program, flag) = ("cmd", "/C");
        #[cfg(not(windows))]
        let (program, flag) = ("sh", "-c");

        Self::new(program).arg(flag).arg(text)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append an argument only when present.
    pub fn arg_opt<S: Into<String>>(self, arg: Option<S>) -> Self {
        match arg {
            Some(arg) => self.arg(arg),
            None => self,
        }
    }

    /// Mask `value` in every displayed form of this line.
    ///
    /// The executed argv is unaffected.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    /// Full argv: program followed by every argument.
    pub fn arguments(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    pub(crate) fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(self.args.iter().map(OsStr::new));
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in redact(&self.args, &self.secrets) {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Outcome of one external command invocation.
///
/// Produced once by the runner and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Argv that was executed.
    pub arguments: Vec<String>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Set when the deadline expired and the child was killed.
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Stdout with surrounding whitespace removed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Last `n` lines of stdout, oldest first.
    pub fn stdout_tail(&self, n: usize) -> Vec<&str> {
        let lines: Vec<&str> = self.stdout.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].to_vec()
    }

    /// Executed argv joined by spaces, with credentials masked.
    pub fn command_line(&self) -> String {
        redact(&self.arguments, &[]).join(" ")
    }
}

/// Mask the value after each secret flag and every occurrence of `secrets`.
fn redact<'a>(args: &'a [String], secrets: &[String]) -> Vec<Cow<'a, str>> {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push(Cow::Borrowed(MASK));
            mask_next = false;
            continue;
        }
        mask_next = SECRET_FLAGS.contains(&arg.as_str());

        let mut text = Cow::Borrowed(arg.as_str());
        for secret in secrets {
            if text.contains(secret.as_str()) {
                text = Cow::Owned(text.replace(secret.as_str(), MASK));
            }
        }
        out.push(text);
    }
    out
}
