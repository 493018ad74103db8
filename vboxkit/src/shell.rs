//! Guest shell selection.
//!
//! A guest command is always handed to an interpreter inside the guest. Which
//! one depends on the guest family and is decided once per session; after
//! that every command is built the same way through [`GuestShell::invocation`].

use std::fmt;

pub const POWERSHELL_EXE: &str = r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe";
pub const CMD_EXE: &str = r"C:\Windows\System32\cmd.exe";
pub const DEFAULT_POSIX_INTERPRETER: &str = "/usr/bin/bash -c";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowsShell {
    PowerShell,
    Cmd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestShell {
    /// Interpreter argv prefix; the command text is appended as one argument.
    Posix { interpreter: Vec<String> },
    Windows(WindowsShell),
}

impl Default for GuestShell {
    fn default() -> Self {
        Self::posix(DEFAULT_POSIX_INTERPRETER)
    }
}

impl GuestShell {
    /// POSIX interpreter from a whitespace-separated prefix such as `sh -c`.
    pub fn posix(interpreter: &str) -> Self {
        Self::Posix {
            interpreter: interpreter.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Pick a shell from a user-supplied name.
    ///
    /// Names mentioning `powershell` or `cmd` select the Windows shells;
    /// anything else is taken as a POSIX interpreter prefix.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("powershell") {
            Self::Windows(WindowsShell::PowerShell)
        } else if lower.contains("cmd") {
            Self::Windows(WindowsShell::Cmd)
        } else if name.trim().is_empty() {
            Self::default()
        } else {
            Self::posix(name)
        }
    }

    /// Default shell for a guest OS product string.
    pub fn for_os_type(os_type: Option<&str>) -> Self {
        match os_type {
            Some(os) if os.to_lowercase().contains("windows") => {
                Self::Windows(WindowsShell::PowerShell)
            }
            _ => Self::default(),
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows(_))
    }

    /// Executable the guest agent must start, for shells that need `--exe`.
    pub fn exe_path(&self) -> Option<&'static str> {
        match self {
            Self::Posix { .. } => None,
            Self::Windows(WindowsShell::PowerShell) => Some(POWERSHELL_EXE),
            Self::Windows(WindowsShell::Cmd) => Some(CMD_EXE),
        }
    }

    /// Guest argv that runs `command` through this shell.
    pub fn invocation(&self, command: &str) -> Vec<String> {
        let mut argv: Vec<String> = match self {
            Self::Posix { interpreter } => interpreter.clone(),
            Self::Windows(WindowsShell::PowerShell) => vec!["powershell.exe".to_string()],
            Self::Windows(WindowsShell::Cmd) => {
                vec!["cmd.exe".to_string(), "/q".to_string(), "/c".to_string()]
            }
        };
        argv.push(command.to_string());
        argv
    }
}

impl fmt::Display for GuestShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posix { interpreter } => write!(f, "{}", interpreter.join(" ")),
            Self::Windows(WindowsShell::PowerShell) => write!(f, "powershell.exe"),
            Self::Windows(WindowsShell::Cmd) => write!(f, "cmd.exe /q /c"),
        }
    }
}
