//! Attached media.

use vboxkit_shared::errors::{VboxError, VboxResult};

use super::VirtualMachine;
use crate::descriptor::{AttachedMediaRecord, ConfigEditor};

impl VirtualMachine {
    /// Media registered in `section` of the descriptor.
    pub async fn attached_media(&self, section: &str, entry: &str) -> VboxResult<Vec<AttachedMediaRecord>> {
        let (section, entry) = (section.to_string(), entry.to_string());
        self.read_descriptor(move |cache| cache.attached_media(&section, &entry))
            .await
    }

    pub async fn dvd_images(&self) -> VboxResult<Vec<AttachedMediaRecord>> {
        self.read_descriptor(|cache| cache.dvd_images()).await
    }

    /// Drop every DVD image registration from the descriptor file.
    ///
    /// Edits the file directly; the machine should not be running and the
    /// tool should not hold the descriptor open.
    ///
    /// # Returns
    /// Number of entries removed.
    pub async fn remove_dvd_images(&self, backup: bool) -> VboxResult<usize> {
        let cache = self.descriptor().await?;
        let editor = ConfigEditor::new(cache.path());
        let removed = tokio::task::spawn_blocking(move || editor.remove_dvd_images(backup))
            .await
            .map_err(|e| VboxError::Internal(format!("edit task failed: {}", e)))??;

        // mtime resolution may hide an edit made within the same tick
        cache.invalidate();
        tracing::info!(vm = %self.id, removed, backup, "Removed DVD images from descriptor");
        Ok(removed)
    }
}
