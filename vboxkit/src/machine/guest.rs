//! Guest control sessions.
//!
//! A [`GuestSession`] bundles guest credentials with the shell chosen for
//! the guest, so every command and file transfer is assembled the same way.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use vboxkit_shared::errors::{VboxError, VboxResult};

use super::VirtualMachine;
use crate::invoker::{CommandResult, CommandRunner, StreamOptions, TracingSink, check};
use crate::shell::{GuestShell, WindowsShell};

/// Guest account used for guest-control operations.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GuestRunOptions {
    pub wait_stdout: bool,
    pub wait_stderr: bool,
    pub timeout: Option<Duration>,
    /// Live output; defaults to a tracing sink labelled with the machine.
    pub stream: Option<StreamOptions>,
    /// Stdout tail kept for display; `None` uses the configured value.
    pub tail_lines: Option<usize>,
}

impl Default for GuestRunOptions {
    fn default() -> Self {
        Self {
            wait_stdout: true,
            wait_stderr: true,
            timeout: None,
            stream: None,
            tail_lines: None,
        }
    }
}

impl GuestRunOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stream(mut self, stream: StreamOptions) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = Some(lines);
        self
    }
}

/// Authenticated guest-control access to one machine.
pub struct GuestSession<'a> {
    vm: &'a VirtualMachine,
    credentials: Credentials,
    shell: GuestShell,
}

impl VirtualMachine {
    /// Open a guest session.
    ///
    /// Without an explicit shell, the guest OS product decides: Windows
    /// guests get PowerShell, everything else the POSIX default.
    pub async fn guest_session(
        &self,
        credentials: Credentials,
        shell: Option<GuestShell>,
    ) -> VboxResult<GuestSession<'_>> {
        let shell = match shell {
            Some(shell) => shell,
            None => GuestShell::for_os_type(self.os_type().await?.as_deref()),
        };
        tracing::debug!(vm = %self.id, user = %credentials.username, shell = %shell, "Opened guest session");
        Ok(GuestSession {
            vm: self,
            credentials,
            shell,
        })
    }
}

impl GuestSession<'_> {
    pub fn shell(&self) -> &GuestShell {
        &self.shell
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn auth_args(&self) -> [String; 4] {
        [
            "--username".to_string(),
            self.credentials.username.clone(),
            "--password".to_string(),
            self.credentials.password.clone(),
        ]
    }

    fn run_arguments(&self, command: &str, options: &GuestRunOptions) -> Vec<String> {
        let mut args = vec![
            "guestcontrol".to_string(),
            self.vm.id.clone(),
            "run".to_string(),
        ];
        if let Some(exe) = self.shell.exe_path() {
            args.push("--exe".to_string());
            args.push(exe.to_string());
        }
        args.extend(self.auth_args());
        if options.wait_stdout {
            args.push("--wait-stdout".to_string());
        }
        if options.wait_stderr {
            args.push("--wait-stderr".to_string());
        }
        if let Some(timeout) = options.timeout {
            args.push("--timeout".to_string());
            args.push(timeout.as_millis().to_string());
        }
        args.push("--".to_string());
        args.extend(self.shell.invocation(command));
        args
    }

    /// Run `command` through the session shell, streaming its output.
    ///
    /// The guest command's exit code is returned in the result rather than
    /// turned into an error.
    pub async fn run(&self, command: &str, options: GuestRunOptions) -> VboxResult<CommandResult> {
        self.run_masked(command, options, &[]).await
    }

    /// Host-side deadline a little past the guest one so the tool can report first.
    fn host_timeout(&self, options: &GuestRunOptions) -> Option<Duration> {
        options
            .timeout
            .map(|t| t + Duration::from_secs(10))
            .or(self.vm.runtime().config.command_timeout())
    }

    async fn run_masked(
        &self,
        command: &str,
        options: GuestRunOptions,
        secrets: &[&str],
    ) -> VboxResult<CommandResult> {
        let runtime = self.vm.runtime();
        let line = secrets.iter().fold(
            runtime
                .config
                .command(self.run_arguments(command, &options))
                .secret(self.credentials.password.clone()),
            |line, secret| line.secret(*secret),
        );

        let tail_lines = options.tail_lines.unwrap_or(runtime.config.stream_tail_lines);
        let stream = options
            .stream
            .clone()
            .unwrap_or_else(|| StreamOptions::new(Arc::new(TracingSink::labeled(self.vm.id.clone()))))
            .with_tail_lines(tail_lines);

        let run_options = runtime
            .config
            .run_options()
            .timeout_opt(self.host_timeout(&options));

        let result = runtime.runner.run_streamed(&line, run_options, stream).await?;
        tracing::debug!(vm = %self.vm.id, exit_code = result.exit_code, "Guest command finished");
        Ok(result)
    }

    /// Copy a host file or directory into the guest.
    pub async fn copy_to(&self, local: impl AsRef<Path>, remote: &str) -> VboxResult<()> {
        let local = local.as_ref().to_string_lossy().into_owned();
        self.transfer("copyto", &local, remote).await
    }

    /// Copy a guest file or directory to the host.
    pub async fn copy_from(&self, remote: &str, local: impl AsRef<Path>) -> VboxResult<()> {
        let local = local.as_ref().to_string_lossy().into_owned();
        self.transfer("copyfrom", remote, &local).await
    }

    async fn transfer(&self, verb: &str, source: &str, destination: &str) -> VboxResult<()> {
        let mut args = vec![
            "guestcontrol".to_string(),
            self.vm.id.clone(),
            verb.to_string(),
        ];
        args.extend(self.auth_args());
        args.push(source.to_string());
        args.push(destination.to_string());

        self.vm.runtime().manage(args).await?;
        tracing::info!(vm = %self.vm.id, verb, source, destination, "Transferred files");
        Ok(())
    }

    /// Change the session user's password inside the guest.
    ///
    /// The session credentials still hold the old password afterwards.
    pub async fn change_password(&self, new_password: &str) -> VboxResult<()> {
        if new_password.is_empty() {
            return Err(VboxError::InvalidArgument("new password must not be empty".into()));
        }

        let user = &self.credentials.username;
        let command = match &self.shell {
            GuestShell::Posix { .. } => format!(
                "printf '%s\\n%s\\n%s\\n' {} {} {} | passwd {}",
                sh_quote(&self.credentials.password),
                sh_quote(new_password),
                sh_quote(new_password),
                sh_quote(user)
            ),
            GuestShell::Windows(WindowsShell::PowerShell) => format!(
                "net user {} {}",
                ps_quote(user),
                ps_quote(new_password)
            ),
            GuestShell::Windows(WindowsShell::Cmd) => {
                format!("net user \"{}\" \"{}\"", user, new_password)
            }
        };

        let options = GuestRunOptions::default();
        let host_timeout = self.host_timeout(&options);
        let result = self.run_masked(&command, options, &[new_password]).await?;

        // Both passwords are inside the guest command line
        let what = format!("change password for {} on {}", user, self.vm.id);
        check(result, host_timeout).map_err(|e| match e {
            VboxError::CommandFailed { exit_code, stderr, .. } => VboxError::CommandFailed {
                command: what,
                exit_code,
                stderr,
            },
            VboxError::Timeout { elapsed, .. } => VboxError::Timeout { what, elapsed },
            other => other,
        })?;
        tracing::info!(vm = %self.vm.id, user = %user, "Changed guest password");
        Ok(())
    }
}

fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{Channel, OutputSink};
    use crate::machine::OS_PRODUCT_PROPERTY;
    use crate::machine::testing::ScriptedRunner;
    use crate::config::ToolConfig;
    use crate::machine::tests::open;
    use crate::runtime::VboxRuntime;
    use crate::shell::{CMD_EXE, POWERSHELL_EXE};

    fn creds() -> Credentials {
        Credentials::new("alice", "old pw")
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let text = format!("{:?}", creds());
        assert!(text.contains("alice"));
        assert!(!text.contains("old pw"));
    }

    #[tokio::test]
    async fn test_shell_detected_from_os_type() {
        let runner = ScriptedRunner::new();
        runner.on(OS_PRODUCT_PROPERTY, "Value: Windows 11 Enterprise");
        let vm = open(&runner);

        let session = vm.guest_session(creds(), None).await.unwrap();
        assert_eq!(session.shell(), &GuestShell::Windows(WindowsShell::PowerShell));

        session.run("Get-Date", GuestRunOptions::default()).await.unwrap();
        let run = runner.calls_matching("guestcontrol");
        assert_eq!(
            run[0],
            format!(
                "vboxmanage guestcontrol vm1 run --exe {} --username alice --password old pw \
                 --wait-stdout --wait-stderr -- powershell.exe Get-Date",
                POWERSHELL_EXE
            )
        );
    }

    #[tokio::test]
    async fn test_explicit_shell_skips_detection() {
        let runner = ScriptedRunner::new();
        let vm = open(&runner);

        let session = vm
            .guest_session(creds(), Some(GuestShell::Windows(WindowsShell::Cmd)))
            .await
            .unwrap();
        session.run("dir", GuestRunOptions::default()).await.unwrap();

        assert!(runner.calls_matching("guestproperty").is_empty());
        assert!(runner.calls()[0].contains(&format!("--exe {}", CMD_EXE)));
        assert!(runner.calls()[0].ends_with("-- cmd.exe /q /c dir"));
    }

    #[tokio::test]
    async fn test_run_streams_to_sink() {
        #[derive(Default)]
        struct Collect(parking_lot::Mutex<Vec<String>>);
        impl OutputSink for Collect {
            fn line(&self, channel: Channel, line: &str) {
                self.0.lock().push(format!("{}: {}", channel, line));
            }
        }

        let runner = ScriptedRunner::new();
        runner.on("guestcontrol", "one\ntwo\nthree\n");
        let vm = open(&runner);
        let session = vm.guest_session(creds(), Some(GuestShell::default())).await.unwrap();

        let sink = Arc::new(Collect::default());
        let result = session
            .run(
                "ls",
                GuestRunOptions::default().stream(StreamOptions::new(sink.clone())),
            )
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(result.stdout, "one\ntwo\nthree\n");
        assert_eq!(sink.0.lock().len(), 3);
        assert!(runner.calls()[0].ends_with("-- /usr/bin/bash -c ls"));
    }

    #[tokio::test]
    async fn test_guest_exit_code_is_data() {
        let runner = ScriptedRunner::new();
        runner.fail("guestcontrol", 2, "ls: cannot access '/nope'");
        let vm = open(&runner);
        let session = vm.guest_session(creds(), Some(GuestShell::default())).await.unwrap();

        let result = session.run("ls /nope", GuestRunOptions::default()).await.unwrap();
        assert_eq!(result.exit_code, 2);
    }

    #[tokio::test]
    async fn test_copy_commands() {
        let runner = ScriptedRunner::new();
        let vm = open(&runner);
        let session = vm.guest_session(creds(), Some(GuestShell::default())).await.unwrap();

        session.copy_to("/tmp/setup.sh", "/home/alice/setup.sh").await.unwrap();
        session.copy_from("/var/log/syslog", "/tmp/syslog").await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "vboxmanage guestcontrol vm1 copyto --username alice --password old pw /tmp/setup.sh /home/alice/setup.sh",
                "vboxmanage guestcontrol vm1 copyfrom --username alice --password old pw /var/log/syslog /tmp/syslog",
            ]
        );
    }

    #[tokio::test]
    async fn test_change_password_posix() {
        let runner = ScriptedRunner::new();
        let vm = open(&runner);
        let session = vm.guest_session(creds(), Some(GuestShell::default())).await.unwrap();

        session.change_password("n3w'pw").await.unwrap();
        let call = &runner.calls()[0];
        assert!(call.ends_with(
            r"-- /usr/bin/bash -c printf '%s\n%s\n%s\n' 'old pw' 'n3w'\''pw' 'n3w'\''pw' | passwd 'alice'"
        ));
    }

    #[tokio::test]
    async fn test_change_password_failure() {
        let runner = ScriptedRunner::new();
        runner.fail("guestcontrol", 1, "passwd: Authentication token manipulation error");
        let vm = open(&runner);
        let session = vm.guest_session(creds(), Some(GuestShell::default())).await.unwrap();

        match session.change_password("secret").await {
            Err(VboxError::CommandFailed { command, stderr, .. }) => {
                assert_eq!(command, "change password for alice on vm1");
                assert!(!command.contains("secret"));
                assert!(stderr.contains("passwd"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_change_password_timeout_hides_passwords() {
        let runner = ScriptedRunner::new();
        runner.time_out("guestcontrol");
        let config = ToolConfig {
            command_timeout_secs: Some(1),
            ..ToolConfig::default()
        };
        let vm = VboxRuntime::with_runner(config, runner.clone()).machine("vm1");
        let session = vm
            .guest_session(Credentials::new("alice", "OLDSECRET"), Some(GuestShell::default()))
            .await
            .unwrap();

        match session.change_password("NEWSECRET").await {
            Err(VboxError::Timeout { what, elapsed }) => {
                assert_eq!(what, "change password for alice on vm1");
                assert_eq!(elapsed, Duration::from_secs(1));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_copy_failure_masks_password() {
        let runner = ScriptedRunner::new();
        runner.fail("copyto", 1, "VBoxManage: error: File not found");
        runner.time_out("copyfrom");
        let vm = open(&runner);
        let session = vm
            .guest_session(Credentials::new("alice", "OLDSECRET"), Some(GuestShell::default()))
            .await
            .unwrap();

        let err = session.copy_to("/tmp/a", "/tmp/b").await.unwrap_err();
        assert!(matches!(err, VboxError::CommandFailed { .. }));
        assert!(!err.to_string().contains("OLDSECRET"));
        assert!(err.to_string().contains("--password ***"));

        let err = session.copy_from("/tmp/b", "/tmp/a").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!err.to_string().contains("OLDSECRET"));
    }
}
