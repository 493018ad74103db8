//! Modification-time cache over a descriptor file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use vboxkit_shared::errors::{VboxError, VboxResult};

use super::records::{AttachedMediaRecord, SnapshotRecord};
use super::tree::DescriptorTree;

struct Cached {
    modified: SystemTime,
    tree: Arc<DescriptorTree>,
}

/// Parsed view of a descriptor file, rebuilt when the file's mtime changes.
///
/// The staleness check and the rebuild happen under one lock.
pub struct ConfigCache {
    path: PathBuf,
    state: Mutex<Option<Cached>>,
    parses: AtomicU64,
}

impl ConfigCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
            parses: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current tree, re-parsed if the file changed since the last parse.
    ///
    /// # Returns
    /// * `ConfigUnavailable` - path missing or not a regular file
    /// * `Parse` - file is not well-formed XML
    pub fn tree(&self) -> VboxResult<Arc<DescriptorTree>> {
        let mut state = self.state.lock();
        let modified = modified_time(&self.path)?;

        if let Some(cached) = state.as_ref()
            && cached.modified == modified
        {
            return Ok(Arc::clone(&cached.tree));
        }

        let text = fs::read_to_string(&self.path).map_err(|e| {
            VboxError::ConfigUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let tree = Arc::new(DescriptorTree::parse(&text)?);
        self.parses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(path = %self.path.display(), "Parsed machine descriptor");

        *state = Some(Cached {
            modified,
            tree: Arc::clone(&tree),
        });
        Ok(tree)
    }

    /// Number of successful parses since construction.
    pub fn parse_count(&self) -> u64 {
        self.parses.load(Ordering::Relaxed)
    }

    /// Drop the cached tree; the next read re-parses unconditionally.
    pub fn invalidate(&self) {
        *self.state.lock() = None;
    }

    pub fn snapshots(&self) -> VboxResult<Vec<SnapshotRecord>> {
        Ok(self.tree()?.snapshots())
    }

    pub fn current_snapshot(&self) -> VboxResult<Option<SnapshotRecord>> {
        Ok(self.tree()?.current_snapshot())
    }

    pub fn attached_media(&self, section: &str, entry: &str) -> VboxResult<Vec<AttachedMediaRecord>> {
        Ok(self.tree()?.media(section, entry))
    }

    pub fn dvd_images(&self) -> VboxResult<Vec<AttachedMediaRecord>> {
        Ok(self.tree()?.dvd_images())
    }
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache")
            .field("path", &self.path)
            .field("loaded", &self.state.lock().is_some())
            .finish()
    }
}

fn modified_time(path: &Path) -> VboxResult<SystemTime> {
    let meta = fs::metadata(path)
        .map_err(|e| VboxError::ConfigUnavailable(format!("{}: {}", path.display(), e)))?;
    if !meta.is_file() {
        return Err(VboxError::ConfigUnavailable(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    meta.modified()
        .map_err(|e| VboxError::ConfigUnavailable(format!("{}: {}", path.display(), e)))
}
