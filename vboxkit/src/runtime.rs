//! Host-level entry point.
//!
//! [`VboxRuntime`] owns the tool configuration and the command runner, and
//! hands out [`VirtualMachine`] facades that share both.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use vboxkit_shared::errors::{VboxError, VboxResult};

use crate::config::ToolConfig;
use crate::invoker::{CommandResult, CommandRunner, ProcessRunner};
use crate::machine::VirtualMachine;
use crate::properties::{MachineEntry, parse_bridged_interfaces, parse_group_list, parse_machine_list};

/// Shared runtime state, cheap to clone.
pub type RuntimeInner = Arc<RuntimeInnerImpl>;

/// Immutable after construction; no locking needed.
pub struct RuntimeInnerImpl {
    pub(crate) config: ToolConfig,
    pub(crate) runner: Arc<dyn CommandRunner>,
}

impl RuntimeInnerImpl {
    /// Run a management subcommand; unsuccessful exits become errors.
    pub(crate) async fn manage<I, S>(&self, sub: I) -> VboxResult<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = self.config.command(sub);
        self.runner
            .run_checked(&command, self.config.run_options())
            .await
    }

    /// Run a management subcommand and report whatever it printed.
    pub(crate) async fn manage_captured<I, S>(&self, sub: I) -> VboxResult<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = self.config.command(sub);
        self.runner.run(&command, self.config.run_options()).await
    }

    /// Stdout of a successful management subcommand.
    pub(crate) async fn manage_output<I, S>(&self, sub: I) -> VboxResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.manage(sub).await?.stdout)
    }

    pub(crate) async fn bridged_interfaces(&self) -> VboxResult<Vec<BTreeMap<String, String>>> {
        Ok(parse_bridged_interfaces(
            &self.manage_output(["list", "bridgedifs"]).await?,
        ))
    }
}

/// Entry point for querying the host and opening machines.
#[derive(Clone)]
pub struct VboxRuntime {
    inner: RuntimeInner,
}

impl VboxRuntime {
    /// Runtime that spawns real `manage_program` processes.
    pub fn new(config: ToolConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner::new()))
    }

    /// Runtime with configuration taken from the environment.
    pub fn from_env() -> Self {
        Self::new(ToolConfig::from_env())
    }

    pub fn with_runner(config: ToolConfig, runner: Arc<dyn CommandRunner>) -> Self {
        tracing::debug!(program = %config.manage_program, "Initialized runtime");
        Self {
            inner: Arc::new(RuntimeInnerImpl { config, runner }),
        }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.inner.config
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.inner.runner)
    }

    /// Facade for the machine with this name or uuid.
    ///
    /// No command runs here; a missing machine surfaces on first use.
    pub fn machine(&self, id: impl Into<String>) -> VirtualMachine {
        VirtualMachine::new(Arc::clone(&self.inner), id.into())
    }

    /// Registered machines, optionally restricted to one group.
    ///
    /// # Errors
    /// `NotFound` when `group` is given and no such group exists.
    pub async fn list_machines(&self, group: Option<&str>) -> VboxResult<Vec<MachineEntry>> {
        let entries = parse_machine_list(&self.inner.manage_output(["list", "vms"]).await?);
        let Some(group) = group else {
            return Ok(entries);
        };

        let group = self.check_group(group).await?;
        let groups = try_join_all(
            entries
                .iter()
                .map(|entry| async move { self.machine(&entry.uuid).group_name().await }),
        )
        .await?;

        Ok(entries
            .into_iter()
            .zip(groups)
            .filter(|(_, g)| g.as_deref() == Some(group.as_str()))
            .map(|(entry, _)| entry)
            .collect())
    }

    pub async fn machine_names(&self, group: Option<&str>) -> VboxResult<Vec<String>> {
        Ok(self
            .list_machines(group)
            .await?
            .into_iter()
            .map(|e| e.name)
            .collect())
    }

    pub async fn machine_uuids(&self, group: Option<&str>) -> VboxResult<Vec<String>> {
        Ok(self
            .list_machines(group)
            .await?
            .into_iter()
            .map(|e| e.uuid)
            .collect())
    }

    /// Group names (last path component of each group).
    pub async fn groups(&self) -> VboxResult<Vec<String>> {
        Ok(parse_group_list(
            &self.inner.manage_output(["list", "groups"]).await?,
        ))
    }

    /// Return `name` if the group exists.
    pub async fn check_group(&self, name: &str) -> VboxResult<String> {
        let groups = self.groups().await?;
        if groups.iter().any(|g| g == name) {
            return Ok(name.to_string());
        }
        Err(VboxError::NotFound(format!(
            "group {} does not exist; known groups: {:?}",
            name, groups
        )))
    }

    /// Fail on the first name that is not a registered machine.
    pub async fn check_machines<S: AsRef<str>>(&self, names: &[S]) -> VboxResult<()> {
        let existing = self.machine_names(None).await?;
        for name in names {
            let name = name.as_ref();
            if !existing.iter().any(|e| e == name) {
                return Err(VboxError::NotFound(format!(
                    "machine {} does not exist; known machines: {:?}",
                    name, existing
                )));
            }
        }
        Ok(())
    }

    /// Whether a machine with this exact name or uuid is registered.
    pub async fn is_registered(&self, id: &str) -> VboxResult<bool> {
        Ok(self
            .list_machines(None)
            .await?
            .iter()
            .any(|e| e.name == id || e.uuid == id))
    }

    /// Host interfaces usable for bridged networking.
    pub async fn bridged_interfaces(&self) -> VboxResult<Vec<BTreeMap<String, String>>> {
        self.inner.bridged_interfaces().await
    }
}

impl std::fmt::Debug for VboxRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VboxRuntime")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
