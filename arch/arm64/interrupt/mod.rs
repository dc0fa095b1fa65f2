//! Interrupt handling for ARM64
//!
//! Provides the primary interrupt controller interface the platform layer
//! routes through, the GIC distributor implementing it, and the Tegra legacy
//! interrupt controller sitting in front of the GIC.

/// GIC distributor driver
pub mod gic;

/// Tegra legacy interrupt controller
pub mod ictlr;

/// Mediated legacy interrupt controller access for the hardware domain
#[cfg(feature = "mlic")]
pub mod mlic;

#[cfg(test)]
pub(crate) mod sim;

use crate::arch::arm64::devtree::DtNodeId;
use crate::core::irq::{IrqDesc, IrqNumber};
use crate::core::vmm::Domain;
use crate::Result;

// Re-export commonly used types
pub use gic::{gicd, GicDistributor};
pub use ictlr::{regs as ictlr_regs, Ictlr, IctlrLayout, IctlrLine};

/// The architecture-level interrupt controller (GIC) interface
///
/// Binding an interrupt to a consumer happens here; platform code layers its
/// own controller handling on top.
pub trait PrimaryInterruptController {
    /// Device tree node of the controller, for direct-attachment checks
    fn node_id(&self) -> DtNodeId;

    /// Bind an interrupt for delivery to the hypervisor
    fn route_irq_to_hypervisor(&self, desc: &mut IrqDesc, priority: u32);

    /// Bind an interrupt for delivery to `domain` as virtual interrupt `virq`
    fn route_irq_to_guest(
        &self,
        domain: &Domain,
        virq: IrqNumber,
        desc: &mut IrqDesc,
        priority: u32,
    ) -> Result<()>;
}
