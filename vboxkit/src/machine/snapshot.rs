//! Snapshot commands and snapshot views.
//!
//! Mutations go through the tool. Reads come either from the descriptor file
//! (`snapshots`, `current_snapshot`) or from `snapshot list` output.

use vboxkit_shared::errors::VboxResult;

use super::VirtualMachine;
use crate::descriptor::SnapshotRecord;
use crate::properties::{CurrentSnapshotInfo, parse_current_snapshot};

impl VirtualMachine {
    pub async fn take_snapshot(&self, name: &str, description: Option<&str>) -> VboxResult<()> {
        let mut args = vec!["snapshot", self.id.as_str(), "take", name];
        if let Some(description) = description {
            args.extend(["--description", description]);
        }
        self.runtime.manage(args).await?;
        tracing::info!(vm = %self.id, snapshot = name, "Took snapshot");
        Ok(())
    }

    pub async fn delete_snapshot(&self, name: &str) -> VboxResult<()> {
        self.runtime
            .manage(["snapshot", self.id.as_str(), "delete", name])
            .await?;
        tracing::info!(vm = %self.id, snapshot = name, "Deleted snapshot");
        Ok(())
    }

    /// Restore `name`, or the current snapshot when `None`.
    pub async fn restore_snapshot(&self, name: Option<&str>) -> VboxResult<()> {
        let args = match name {
            Some(name) => vec!["snapshot", self.id.as_str(), "restore", name],
            None => vec!["snapshot", self.id.as_str(), "restorecurrent"],
        };
        self.runtime.manage(args).await?;
        tracing::info!(vm = %self.id, snapshot = name.unwrap_or("<current>"), "Restored snapshot");
        Ok(())
    }

    pub async fn rename_snapshot(&self, old_name: &str, new_name: &str) -> VboxResult<()> {
        self.runtime
            .manage(["snapshot", self.id.as_str(), "edit", old_name, "--name", new_name])
            .await?;
        tracing::info!(vm = %self.id, from = old_name, to = new_name, "Renamed snapshot");
        Ok(())
    }

    /// Human-readable `snapshot list` lines.
    ///
    /// The tool exits non-zero for a machine without snapshots, so the exit
    /// code is not checked here.
    pub async fn list_snapshots_raw(&self) -> VboxResult<Vec<String>> {
        let result = self
            .runtime
            .manage_captured(["snapshot", self.id.as_str(), "list"])
            .await?;
        Ok(result.stdout.lines().map(str::to_string).collect())
    }

    /// Every snapshot in the descriptor, flattened in document order.
    pub async fn snapshots(&self) -> VboxResult<Vec<SnapshotRecord>> {
        self.read_descriptor(|cache| cache.snapshots()).await
    }

    /// Snapshot the descriptor marks as current.
    pub async fn current_snapshot(&self) -> VboxResult<Option<SnapshotRecord>> {
        self.read_descriptor(|cache| cache.current_snapshot()).await
    }

    /// Current snapshot as reported by `snapshot list --machinereadable`.
    pub async fn current_snapshot_by_command(&self) -> VboxResult<Option<CurrentSnapshotInfo>> {
        let result = self
            .runtime
            .manage_captured(["snapshot", self.id.as_str(), "list", "--machinereadable"])
            .await?;
        Ok(parse_current_snapshot(&result.stdout))
    }
}
