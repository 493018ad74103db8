//! Registration and relocation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use vboxkit_shared::errors::{VboxError, VboxResult};

use super::VirtualMachine;
use crate::descriptor::ConfigCache;
use crate::properties::parse_machine_list;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOptions {
    /// Move files `movevm` left behind into the new directory.
    pub move_remaining_files: bool,
    /// Remove the old directory once it is empty.
    pub delete_old_directory: bool,
}

/// What happened to the old machine directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MoveReport {
    pub old_dir: PathBuf,
    pub new_dir: PathBuf,
    /// Entries found in the old directory after `movevm`.
    pub leftovers: Vec<String>,
    pub moved: Vec<String>,
    pub old_dir_removed: bool,
}

impl VirtualMachine {
    /// Whether this machine's name or uuid appears in `list vms`.
    pub async fn is_registered(&self) -> VboxResult<bool> {
        let output = self.runtime.manage_output(["list", "vms"]).await?;
        Ok(parse_machine_list(&output)
            .iter()
            .any(|e| e.name == self.id || e.uuid == self.id))
    }

    /// Register the machine from its descriptor unless already registered.
    ///
    /// # Returns
    /// `true` if a registration happened.
    pub async fn register(&self, vbox_file: impl AsRef<Path>) -> VboxResult<bool> {
        let vbox_file = vbox_file.as_ref();
        if self.is_registered().await? {
            tracing::info!(vm = %self.id, "Machine already registered");
            return Ok(false);
        }
        if !vbox_file.is_file() {
            return Err(VboxError::NotFound(format!(
                "descriptor {} does not exist",
                vbox_file.display()
            )));
        }

        let path = vbox_file.to_string_lossy().into_owned();
        self.runtime.manage(["registervm", path.as_str()]).await?;
        *self.descriptor.lock() = Some(std::sync::Arc::new(ConfigCache::new(vbox_file)));
        tracing::info!(vm = %self.id, path = %vbox_file.display(), "Registered machine");
        Ok(true)
    }

    /// Move the machine's files under `target_dir` with `movevm`.
    ///
    /// The machine must be powered off. Afterwards the descriptor path is
    /// resolved again; files the tool did not move are handled according to
    /// `options`. Failures on individual leftovers are logged, not returned.
    pub async fn move_to(&self, target_dir: impl AsRef<Path>, options: MoveOptions) -> VboxResult<MoveReport> {
        let target_dir = target_dir.as_ref();
        if self.power_status().await? {
            return Err(VboxError::InvalidState(format!(
                "{} must be powered off before moving",
                self.id
            )));
        }

        let old_dir = self.vm_dir().await?;
        tracing::info!(
            vm = %self.id,
            from = %old_dir.display(),
            to = %target_dir.display(),
            "Moving machine"
        );

        let target = target_dir.to_string_lossy().into_owned();
        self.runtime
            .manage(["movevm", self.id.as_str(), "--folder", target.as_str()])
            .await?;

        let new_dir = self
            .resolve_descriptor()
            .await?
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| target_dir.to_path_buf());

        let id = self.id.clone();
        let report = tokio::task::spawn_blocking(move || tidy_old_dir(&id, old_dir, new_dir, options))
            .await
            .map_err(|e| VboxError::Internal(format!("move cleanup task failed: {}", e)))?;
        Ok(report)
    }
}

fn tidy_old_dir(id: &str, old_dir: PathBuf, new_dir: PathBuf, options: MoveOptions) -> MoveReport {
    let mut report = MoveReport {
        old_dir,
        new_dir,
        ..MoveReport::default()
    };
    if report.old_dir == report.new_dir || !report.old_dir.is_dir() {
        return report;
    }

    report.leftovers = match fs::read_dir(&report.old_dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            tracing::warn!(vm = %id, error = %e, "Could not list old directory");
            return report;
        }
    };
    report.leftovers.sort();

    if !report.leftovers.is_empty() {
        tracing::warn!(vm = %id, count = report.leftovers.len(), "Files left in old directory");
        if !options.move_remaining_files {
            return report;
        }
        for name in &report.leftovers {
            let from = report.old_dir.join(name);
            let to = report.new_dir.join(name);
            match move_entry(&from, &to) {
                Ok(()) => report.moved.push(name.clone()),
                Err(e) => tracing::warn!(vm = %id, entry = %name, error = %e, "Could not move leftover"),
            }
        }
    }

    if options.delete_old_directory {
        // remove_dir refuses non-empty directories
        match fs::remove_dir(&report.old_dir) {
            Ok(()) => {
                report.old_dir_removed = true;
                tracing::info!(vm = %id, dir = %report.old_dir.display(), "Removed old directory");
            }
            Err(e) => tracing::warn!(vm = %id, error = %e, "Could not remove old directory"),
        }
    }
    report
}

/// Rename, falling back to copy-and-delete across filesystems.
fn move_entry(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if from.is_dir() {
        copy_dir(from, to)?;
        fs::remove_dir_all(from)
    } else {
        fs::copy(from, to)?;
        fs::remove_file(from)
    }
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
