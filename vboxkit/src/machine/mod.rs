//! Virtual machine facade.
//!
//! ## Architecture
//!
//! [`VirtualMachine`] is thin glue over the core building blocks:
//! - queries go through the runner and `properties` parsers
//! - waits go through the `poller`
//! - snapshot and media views come from a lazily resolved [`ConfigCache`]
//!
//! The operations are grouped by concern in submodules:
//! - `lifecycle`: start/stop/shutdown and the wait operations
//! - `hardware`: cpu, memory, audio, virtualization and USB switches
//! - `network`: adapters and guest IP
//! - `snapshot`: snapshot commands and descriptor-backed snapshot views
//! - `storage`: attached media
//! - `registration`: register and move
//! - `guest`: guest-control sessions

mod guest;
mod hardware;
mod lifecycle;
mod network;
mod registration;
mod snapshot;
mod storage;
#[cfg(test)]
pub(crate) mod testing;

pub use guest::{Credentials, GuestRunOptions, GuestSession};
pub use hardware::UsbController;
pub use network::{AdapterSettings, AttachmentKind};
pub use registration::{MoveOptions, MoveReport};

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use vboxkit_shared::errors::{VboxError, VboxResult};

use crate::descriptor::ConfigCache;
use crate::properties::{
    GuestProperty, PropertyTable, lookup, parse_guest_property, parse_guest_property_list,
};
use crate::runtime::RuntimeInner;

pub(crate) const OS_PRODUCT_PROPERTY: &str = "/VirtualBox/GuestInfo/OS/Product";
pub(crate) const LOGGED_USERS_PROPERTY: &str = "/VirtualBox/GuestInfo/OS/LoggedInUsersList";

/// One machine, addressed by name or uuid.
///
/// Holds `RuntimeInner` for the configuration and the runner. The only
/// mutable state is the descriptor cache, which is resolved on first use
/// and replaced when the recorded descriptor path stops being a file.
pub struct VirtualMachine {
    id: String,
    runtime: RuntimeInner,
    descriptor: Mutex<Option<Arc<ConfigCache>>>,
}

impl VirtualMachine {
    pub(crate) fn new(runtime: RuntimeInner, id: String) -> Self {
        Self {
            id,
            runtime,
            descriptor: Mutex::new(None),
        }
    }

    /// Use a known descriptor path instead of asking the tool for it.
    pub fn with_config_path(self, path: impl Into<PathBuf>) -> Self {
        *self.descriptor.lock() = Some(Arc::new(ConfigCache::new(path)));
        self
    }

    /// Name or uuid this facade was opened with.
    pub fn id(&self) -> &str {
        &self.id
    }

    // ========================================================================
    // INTROSPECTION
    // ========================================================================

    /// Raw `showvminfo` output.
    pub async fn info(&self, machine_readable: bool) -> VboxResult<String> {
        if machine_readable {
            self.runtime
                .manage_output(["showvminfo", self.id.as_str(), "--machinereadable"])
                .await
        } else {
            self.runtime.manage_output(["showvminfo", self.id.as_str()]).await
        }
    }

    /// Every key of the machine-readable dump.
    pub async fn properties(&self) -> VboxResult<PropertyTable> {
        Ok(PropertyTable::parse(&self.info(true).await?))
    }

    /// One key of the machine-readable dump, first occurrence wins.
    pub async fn parameter(&self, key: &str) -> VboxResult<Option<String>> {
        Ok(lookup(&self.info(true).await?, key))
    }

    /// Guest property value; `None` when it has no value.
    pub async fn guest_property(&self, name: &str) -> VboxResult<Option<String>> {
        let output = self
            .runtime
            .manage_output(["guestproperty", "get", self.id.as_str(), name])
            .await?;
        Ok(parse_guest_property(&output))
    }

    /// All guest properties currently published.
    pub async fn guest_properties(&self) -> VboxResult<Vec<GuestProperty>> {
        let output = self
            .runtime
            .manage_output(["guestproperty", "enumerate", self.id.as_str()])
            .await?;
        Ok(parse_guest_property_list(&output))
    }

    /// Guest OS product string reported by the guest additions.
    pub async fn os_type(&self) -> VboxResult<Option<String>> {
        Ok(self
            .guest_property(OS_PRODUCT_PROPERTY)
            .await?
            .filter(|v| !v.is_empty()))
    }

    pub async fn logged_user(&self) -> VboxResult<Option<String>> {
        Ok(self
            .guest_property(LOGGED_USERS_PROPERTY)
            .await?
            .filter(|v| !v.is_empty()))
    }

    /// Group the machine belongs to, slashes removed.
    pub async fn group_name(&self) -> VboxResult<Option<String>> {
        Ok(self
            .parameter("groups")
            .await?
            .map(|g| g.trim().replace('/', "")))
    }

    /// `true` when the machine state is `running`.
    ///
    /// An unreadable state counts as not running.
    pub async fn power_status(&self) -> VboxResult<bool> {
        match self.parameter("VMState").await? {
            Some(state) => Ok(state.eq_ignore_ascii_case("running")),
            None => {
                tracing::warn!(vm = %self.id, "Unable to determine machine state");
                Ok(false)
            }
        }
    }

    // ========================================================================
    // DESCRIPTOR
    // ========================================================================

    /// Cache over the machine's descriptor file.
    ///
    /// The path comes from `CfgFile` and is looked up again whenever the
    /// previously recorded path no longer points to a file.
    ///
    /// # Errors
    /// `ConfigUnavailable` when the tool reports no descriptor path.
    pub async fn descriptor(&self) -> VboxResult<Arc<ConfigCache>> {
        let cached = self.descriptor.lock().clone();
        if let Some(cache) = cached
            && cache.path().is_file()
        {
            return Ok(cache);
        }
        self.resolve_descriptor().await
    }

    /// Run `read` against the descriptor cache on the blocking pool.
    ///
    /// A cache miss reads and parses the file under the cache lock.
    pub(crate) async fn read_descriptor<T, F>(&self, read: F) -> VboxResult<T>
    where
        F: FnOnce(&ConfigCache) -> VboxResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.descriptor().await?;
        tokio::task::spawn_blocking(move || read(&cache))
            .await
            .map_err(|e| VboxError::Internal(format!("descriptor read task failed: {}", e)))?
    }

    pub async fn config_path(&self) -> VboxResult<PathBuf> {
        Ok(self.descriptor().await?.path().to_path_buf())
    }

    /// Directory holding the descriptor file.
    pub async fn vm_dir(&self) -> VboxResult<PathBuf> {
        let path = self.config_path().await?;
        path.parent().map(|p| p.to_path_buf()).ok_or_else(|| {
            VboxError::ConfigUnavailable(format!(
                "{}: descriptor path {} has no parent",
                self.id,
                path.display()
            ))
        })
    }

    /// Forget the recorded path and ask the tool again.
    pub(crate) async fn resolve_descriptor(&self) -> VboxResult<Arc<ConfigCache>> {
        let path = self
            .parameter("CfgFile")
            .await?
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                VboxError::ConfigUnavailable(format!("{}: no descriptor path reported", self.id))
            })?;

        tracing::debug!(vm = %self.id, path = %path, "Resolved descriptor path");
        let cache = Arc::new(ConfigCache::new(path));
        *self.descriptor.lock() = Some(Arc::clone(&cache));
        Ok(cache)
    }

    pub(crate) fn runtime(&self) -> &RuntimeInner {
        &self.runtime
    }
}

impl std::fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("id", &self.id)
            .field("descriptor", &*self.descriptor.lock())
            .finish()
    }
}
