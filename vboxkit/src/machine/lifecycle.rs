//! Power control and the wait operations built on the poller.

use std::time::Duration;

use vboxkit_shared::errors::{VboxError, VboxResult};

use super::VirtualMachine;
use crate::poller::poll_until;

impl VirtualMachine {
    /// Power the machine on unless it is already running.
    pub async fn start(&self, headless: bool) -> VboxResult<()> {
        if self.power_status().await? {
            tracing::info!(vm = %self.id, "Machine already running");
            return Ok(());
        }

        tracing::info!(vm = %self.id, headless, "Starting machine");
        let mut args = vec!["startvm", self.id.as_str()];
        if headless {
            args.extend(["--type", "headless"]);
        }
        self.runtime.manage(args).await?;
        Ok(())
    }

    /// Hard power-off, optionally waiting until the machine reports it.
    pub async fn stop(&self, wait: bool) -> VboxResult<()> {
        tracing::info!(vm = %self.id, "Powering off machine");
        self.runtime
            .manage(["controlvm", self.id.as_str(), "poweroff"])
            .await?;
        if wait {
            self.wait_until_shutdown(None).await?;
        }
        Ok(())
    }

    /// Press the virtual ACPI power button; the guest decides what happens.
    pub async fn shutdown(&self) -> VboxResult<()> {
        tracing::info!(vm = %self.id, "Sending ACPI power button");
        self.runtime
            .manage(["controlvm", self.id.as_str(), "acpipowerbutton"])
            .await?;
        Ok(())
    }

    /// Wait until the machine is no longer running.
    ///
    /// `None` uses the configured shutdown budget.
    pub async fn wait_until_shutdown(&self, timeout: Option<Duration>) -> VboxResult<()> {
        let timeout = timeout
            .unwrap_or_else(|| Duration::from_secs(self.runtime.config.shutdown_timeout_secs));
        let options = self.runtime.config.poll_options(timeout);
        let what = format!("{} to power off", self.id);

        poll_until(&what, &options, || async move {
            Ok::<_, VboxError>((!self.power_status().await?).then_some(()))
        })
        .await?;
        tracing::info!(vm = %self.id, "Machine is powered off");
        Ok(())
    }

    /// Wait until the guest reports a logged-in user and return it.
    pub async fn wait_logged_user(&self, timeout: Option<Duration>) -> VboxResult<String> {
        let timeout =
            timeout.unwrap_or_else(|| Duration::from_secs(self.runtime.config.login_timeout_secs));
        let options = self.runtime.config.poll_options(timeout);
        let what = format!("a logged-in user on {}", self.id);

        let user = poll_until(&what, &options, || self.logged_user()).await?;
        tracing::info!(vm = %self.id, user = %user, "User logged in");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{SHOWVMINFO, open};
    use super::super::testing::ScriptedRunner;
    use super::super::LOGGED_USERS_PROPERTY;
    use std::time::Duration;

    #[tokio::test]
    async fn test_start_skips_running_machine() {
        let runner = ScriptedRunner::new();
        runner.on("showvminfo", "VMState=\"running\"\n");
        let vm = open(&runner);

        vm.start(true).await.unwrap();
        assert!(runner.calls_matching("startvm").is_empty());
    }

    #[tokio::test]
    async fn test_start_headless() {
        let runner = ScriptedRunner::new();
        runner.on("showvminfo", SHOWVMINFO);
        let vm = open(&runner);

        vm.start(true).await.unwrap();
        assert_eq!(
            runner.calls_matching("startvm"),
            vec!["vboxmanage startvm vm1 --type headless"]
        );
    }

    #[tokio::test]
    async fn test_stop_waits_for_power_off() {
        let runner = ScriptedRunner::new();
        runner.on("showvminfo", "VMState=\"running\"\n");
        runner.on("showvminfo", "VMState=\"running\"\n");
        runner.on("showvminfo", "VMState=\"poweroff\"\n");
        let vm = open(&runner);

        vm.stop(true).await.unwrap();
        assert_eq!(runner.calls_matching("controlvm vm1 poweroff").len(), 1);
        assert_eq!(runner.calls_matching("showvminfo").len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_wait_times_out() {
        let runner = ScriptedRunner::new();
        runner.on("showvminfo", "VMState=\"running\"\n");
        let vm = open(&runner);

        vm.shutdown().await.unwrap();
        let err = vm
            .wait_until_shutdown(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("vm1 to power off"));
    }

    #[tokio::test]
    async fn test_wait_logged_user() {
        let runner = ScriptedRunner::new();
        runner.on(LOGGED_USERS_PROPERTY, "No value set!");
        runner.on(LOGGED_USERS_PROPERTY, "Value: alice");
        let vm = open(&runner);

        let user = vm.wait_logged_user(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(user, "alice");
    }

    #[tokio::test]
    async fn test_probe_error_propagates() {
        let runner = ScriptedRunner::new();
        runner.fail("showvminfo", 1, "Could not find a registered machine named 'vm1'");
        let vm = open(&runner);

        let err = vm
            .wait_until_shutdown(Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(!err.is_timeout());
    }
}
