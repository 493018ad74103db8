//! Network adapters and guest address discovery.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use vboxkit_shared::errors::{VboxError, VboxResult};

use super::VirtualMachine;
use crate::poller::poll_until;

pub(crate) const IPV4_PROPERTY: &str = "/VirtualBox/GuestInfo/Net/0/V4/IP";

/// Highest adapter slot the tool accepts.
const MAX_ADAPTER_SLOT: u8 = 8;

/// What an adapter is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Nat,
    Bridged,
    IntNet,
    HostOnly,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Nat => "nat",
            AttachmentKind::Bridged => "bridged",
            AttachmentKind::IntNet => "intnet",
            AttachmentKind::HostOnly => "hostonly",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentKind {
    type Err = VboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nat" => Ok(AttachmentKind::Nat),
            "bridged" => Ok(AttachmentKind::Bridged),
            "intnet" => Ok(AttachmentKind::IntNet),
            "hostonly" => Ok(AttachmentKind::HostOnly),
            other => Err(VboxError::InvalidArgument(format!(
                "unknown attachment {:?}; expected nat, bridged, intnet or hostonly",
                other
            ))),
        }
    }
}

/// Settings for one adapter slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSettings {
    /// 1-based slot number.
    pub slot: u8,
    pub enabled: bool,
    pub kind: AttachmentKind,
    /// Host interface; only used for enabled bridged adapters.
    pub bridge_adapter: Option<String>,
}

impl AdapterSettings {
    pub fn new(slot: u8) -> Self {
        Self {
            slot,
            enabled: true,
            kind: AttachmentKind::Nat,
            bridge_adapter: None,
        }
    }

    pub fn kind(mut self, kind: AttachmentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn bridge_adapter(mut self, name: impl Into<String>) -> Self {
        self.bridge_adapter = Some(name.into());
        self
    }

    fn arguments(&self, id: &str) -> VboxResult<Vec<String>> {
        if self.slot == 0 || self.slot > MAX_ADAPTER_SLOT {
            return Err(VboxError::InvalidArgument(format!(
                "adapter slot {} out of range 1..={}",
                self.slot, MAX_ADAPTER_SLOT
            )));
        }

        let mut args = vec![
            "modifyvm".to_string(),
            id.to_string(),
            format!("--nic{}", self.slot),
            if self.enabled { self.kind.as_str() } else { "none" }.to_string(),
        ];
        if self.enabled
            && self.kind == AttachmentKind::Bridged
            && let Some(name) = &self.bridge_adapter
        {
            args.push(format!("--bridgeadapter{}", self.slot));
            args.push(name.clone());
        }
        Ok(args)
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self::new(1)
    }
}

impl VirtualMachine {
    pub async fn set_adapter(&self, settings: &AdapterSettings) -> VboxResult<()> {
        let args = settings.arguments(&self.id)?;
        self.runtime.manage(args).await?;
        tracing::info!(
            vm = %self.id,
            slot = settings.slot,
            enabled = settings.enabled,
            kind = %settings.kind,
            bridge = ?settings.bridge_adapter,
            "Configured network adapter"
        );
        Ok(())
    }

    /// Host interfaces usable for bridged networking.
    pub async fn bridged_interfaces(&self) -> VboxResult<Vec<BTreeMap<String, String>>> {
        self.runtime.bridged_interfaces().await
    }

    /// IPv4 address of the first guest adapter, once the guest reports one.
    pub async fn ip_address(&self) -> VboxResult<Option<String>> {
        Ok(self
            .guest_property(IPV4_PROPERTY)
            .await?
            .filter(|ip| !ip.is_empty()))
    }

    /// Wait until the guest reports an IPv4 address and return it.
    pub async fn wait_network_up(&self, timeout: Option<Duration>) -> VboxResult<String> {
        let timeout = timeout
            .unwrap_or_else(|| Duration::from_secs(self.runtime.config.network_timeout_secs));
        let options = self.runtime.config.poll_options(timeout);
        let what = format!("network on {}", self.id);

        let ip = poll_until(&what, &options, || self.ip_address()).await?;
        tracing::info!(vm = %self.id, ip = %ip, "Network adapter is up");
        Ok(ip)
    }
}
