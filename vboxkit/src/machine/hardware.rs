//! Hardware switches applied with `modifyvm`.

use vboxkit_shared::errors::{VboxError, VboxResult};

use super::VirtualMachine;

/// USB host controller generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbController {
    /// USB 1.1
    Ohci,
    /// USB 2.0
    Ehci,
    /// USB 3.0
    Xhci,
}

impl UsbController {
    fn flag(self) -> &'static str {
        match self {
            UsbController::Ohci => "--usb",
            UsbController::Ehci => "--usb-ehci",
            UsbController::Xhci => "--usb-xhci",
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

impl VirtualMachine {
    async fn modify(&self, flag: &str, value: &str) -> VboxResult<()> {
        self.runtime
            .manage(["modifyvm", self.id.as_str(), flag, value])
            .await?;
        tracing::info!(vm = %self.id, setting = flag, value, "Modified machine");
        Ok(())
    }

    pub async fn set_cpus(&self, count: u32) -> VboxResult<()> {
        if count == 0 {
            return Err(VboxError::InvalidArgument("cpu count must be at least 1".into()));
        }
        self.modify("--cpus", &count.to_string()).await
    }

    /// Guest RAM in MiB.
    pub async fn set_memory(&self, mib: u64) -> VboxResult<()> {
        if mib == 0 {
            return Err(VboxError::InvalidArgument("memory size must be non-zero".into()));
        }
        self.modify("--memory", &mib.to_string()).await
    }

    pub async fn set_audio(&self, enabled: bool) -> VboxResult<()> {
        self.modify("--audio-driver", if enabled { "default" } else { "none" })
            .await
    }

    /// Expose VT-x/AMD-V to the guest.
    pub async fn set_nested_virtualization(&self, enabled: bool) -> VboxResult<()> {
        self.modify("--nested-hw-virt", on_off(enabled)).await
    }

    /// Speculative execution controls (Spectre/Meltdown mitigations on the host).
    pub async fn set_speculative_execution_control(&self, enabled: bool) -> VboxResult<()> {
        self.modify("--spec-ctrl", on_off(enabled)).await
    }

    pub async fn set_usb_controller(&self, controller: UsbController, enabled: bool) -> VboxResult<()> {
        self.modify(controller.flag(), on_off(enabled)).await
    }
}
