//! Platform-specific support for ARM64
//!
//! A platform is picked once at boot from the machine node's compatible
//! strings. Its hooks are then called by the interrupt code whenever a line
//! is classified or routed.

/// NVIDIA Tegra K1/X1
pub mod tegra;

use crate::arch::arm64::devtree::{match_node, DeviceMatch, DtNode, RawIrq};
use crate::core::irq::{IrqDesc, IrqNumber};
use crate::core::vmm::{Domain, MmioBus};
use crate::Result;

/// Static description of a supported platform
#[derive(Debug)]
pub struct PlatformDesc {
    /// Human readable platform name
    pub name: &'static str,
    /// Machine compatible strings the platform claims
    pub compatible: &'static [&'static str],
    /// Devices that must never be handed to the hardware domain
    pub blacklist_dev: &'static [DeviceMatch],
}

impl PlatformDesc {
    /// Check whether the platform claims the machine node
    pub fn matches(&self, machine: &DtNode<'_>) -> bool {
        self.compatible.iter().any(|c| machine.is_compatible(c))
    }
}

/// Every platform known to the hypervisor
pub static PLATFORMS: &[&PlatformDesc] = &[&tegra::TEGRA_DESC];

/// Find the platform claiming the machine node
pub fn find(machine: &DtNode<'_>) -> Option<&'static PlatformDesc> {
    PLATFORMS.iter().copied().find(|desc| desc.matches(machine))
}

/// Hooks a platform provides to the interrupt and domain-building code
pub trait Platform {
    /// Descriptor this platform was registered with
    fn descriptor(&self) -> &'static PlatformDesc;

    /// Platform name
    fn identify(&self) -> &'static str {
        self.descriptor().name
    }

    /// One-time platform bring-up
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reset the whole system
    fn reset(&self) {}

    /// Whether a device-tree interrupt can be routed by the hypervisor
    fn is_routable(&self, rirq: &RawIrq<'_>) -> bool;

    /// Route an interrupt to the hypervisor
    ///
    /// The caller holds the descriptor lock.
    fn route_to_hypervisor(&self, desc: &mut IrqDesc, priority: u32);

    /// Route an interrupt to `domain` as virtual interrupt `virq`
    ///
    /// The caller holds the descriptor lock.
    fn route_to_guest(
        &self,
        domain: &Domain,
        virq: IrqNumber,
        desc: &mut IrqDesc,
        priority: u32,
    ) -> Result<()>;

    /// Whether a device must be hidden from the hardware domain
    fn is_device_blacklisted(&self, node: &DtNode<'_>) -> bool {
        match_node(self.descriptor().blacklist_dev, node).is_some()
    }

    /// Platform specific hardware domain setup (trapped ranges and the like)
    fn hwdom_init<'h>(&'h self, _domain: &Domain, _bus: &mut MmioBus<'h>) -> Result<()> {
        Ok(())
    }
}
