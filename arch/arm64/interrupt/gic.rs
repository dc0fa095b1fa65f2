//! GIC (Generic Interrupt Controller) distributor driver for ARM64
//!
//! Tegra K1/X1 carry a GICv2 (GIC-400). Only the distributor matters for
//! routing: it holds the per-interrupt enable, priority and target state.
//! Reference: ARM IHI 0048B (GIC architecture specification)

use crate::arch::arm64::devtree::DtNodeId;
use crate::arch::arm64::interrupt::PrimaryInterruptController;
use crate::arch::common::{IoMapper, MmioAccess, RegisterWindow};
use crate::config::NR_LOCAL_IRQS;
use crate::core::irq::{IrqDesc, IrqNumber, IrqOwner, IrqStatus};
use crate::core::sync::SpinLock;
use crate::core::vmm::Domain;
use crate::{Error, Result};

/// GIC Distributor register offsets
pub mod gicd {
    /// GICD_CTLR - Distributor Control Register
    pub const CTLR: usize = 0x000;
    /// GICD_TYPER - Distributor Type Register
    pub const TYPER: usize = 0x004;
    /// GICD_ISENABLER - Interrupt Set-Enable Registers
    pub const ISENABLER: usize = 0x100;
    /// GICD_ICENABLER - Interrupt Clear-Enable Registers
    pub const ICENABLER: usize = 0x180;
    /// GICD_IPRIORITYR - Interrupt Priority Registers
    pub const IPRIORITYR: usize = 0x400;
    /// GICD_ITARGETSR - Interrupt Processor Targets Registers
    pub const ITARGETSR: usize = 0x800;

    /// Size of the distributor register frame
    pub const SIZE: usize = 0x1000;

    /// GICD_CTLR enable bit
    pub const CTLR_ENABLE: u32 = 1 << 0;
    /// GICD_TYPER ITLinesNumber field
    pub const TYPER_ITLINES_MASK: u32 = 0x1f;
}

/// Highest priority value the distributor stores
pub const GIC_PRIORITY_MAX: u32 = 0xff;

/// GICv2 distributor
pub struct GicDistributor<R: MmioAccess> {
    window: RegisterWindow<R>,
    node: DtNodeId,
    num_irqs: u32,
    /// Serializes read-modify-write of registers shared by several lines
    rmw: SpinLock<()>,
}

impl<R: MmioAccess> GicDistributor<R> {
    /// Map the distributor frame at `base`, owned by device tree node `node`
    ///
    /// The number of implemented interrupts is read from GICD_TYPER.
    pub fn map<M>(mapper: &M, base: u64, node: DtNodeId) -> Option<Self>
    where
        M: IoMapper<Region = R>,
    {
        let window = RegisterWindow::map(mapper, base, gicd::SIZE)?;
        let it_lines = window.read_u32(gicd::TYPER) & gicd::TYPER_ITLINES_MASK;
        let num_irqs = (32 * (it_lines + 1)).min(1020);

        log::info!("GIC: distributor at {:#x}, {} interrupts", base, num_irqs);
        Some(Self {
            window,
            node,
            num_irqs,
            rmw: SpinLock::new(()),
        })
    }

    /// Number of implemented interrupts
    pub fn num_irqs(&self) -> u32 {
        self.num_irqs
    }

    /// Enable the distributor
    pub fn enable(&self) {
        let _guard = self.rmw.lock();
        let ctlr = self.window.read_u32(gicd::CTLR);
        self.window.write_u32(gicd::CTLR, ctlr | gicd::CTLR_ENABLE);
    }

    /// Enable an interrupt
    pub fn enable_irq(&self, irq: IrqNumber) {
        let offset = gicd::ISENABLER + (irq as usize / 32) * 4;
        self.window.write_u32(offset, 1 << (irq % 32));
    }

    /// Disable an interrupt
    pub fn disable_irq(&self, irq: IrqNumber) {
        let offset = gicd::ICENABLER + (irq as usize / 32) * 4;
        self.window.write_u32(offset, 1 << (irq % 32));
    }

    // Priority and target registers hold one byte per interrupt.
    fn write_byte_field(&self, base: usize, irq: IrqNumber, value: u8) {
        let offset = base + (irq as usize & !3);
        let shift = (irq % 4) * 8;

        let _guard = self.rmw.lock();
        let mut val = self.window.read_u32(offset);
        val &= !(0xff << shift);
        val |= (value as u32) << shift;
        self.window.write_u32(offset, val);
    }

    fn read_byte_field(&self, base: usize, irq: IrqNumber) -> u8 {
        let offset = base + (irq as usize & !3);
        (self.window.read_u32(offset) >> ((irq % 4) * 8)) as u8
    }

    /// Set interrupt priority
    pub fn set_priority(&self, irq: IrqNumber, priority: u8) {
        self.write_byte_field(gicd::IPRIORITYR, irq, priority);
    }

    /// Get interrupt priority
    pub fn priority(&self, irq: IrqNumber) -> u8 {
        self.read_byte_field(gicd::IPRIORITYR, irq)
    }

    /// Set the CPU target mask of a shared interrupt
    pub fn set_target(&self, irq: IrqNumber, cpu_mask: u8) {
        self.write_byte_field(gicd::ITARGETSR, irq, cpu_mask);
    }

    /// Get the CPU target mask of a shared interrupt
    pub fn target(&self, irq: IrqNumber) -> u8 {
        self.read_byte_field(gicd::ITARGETSR, irq)
    }

    fn program(&self, irq: IrqNumber, priority: u8) {
        self.set_priority(irq, priority);
        // Banked per CPU for SGIs and PPIs
        if irq >= NR_LOCAL_IRQS {
            self.set_target(irq, 1);
        }
    }
}

impl<R: MmioAccess> PrimaryInterruptController for GicDistributor<R> {
    fn node_id(&self) -> DtNodeId {
        self.node
    }

    fn route_irq_to_hypervisor(&self, desc: &mut IrqDesc, priority: u32) {
        assert!(desc.irq < self.num_irqs, "IRQ {} not implemented by the GIC", desc.irq);

        self.program(desc.irq, priority.min(GIC_PRIORITY_MAX) as u8);
        desc.owner = IrqOwner::Hypervisor;
        desc.priority = priority;
        desc.virq = None;
        desc.status.remove(IrqStatus::GUEST);
        desc.status.insert(IrqStatus::HYPERVISOR);
    }

    fn route_irq_to_guest(
        &self,
        domain: &Domain,
        virq: IrqNumber,
        desc: &mut IrqDesc,
        priority: u32,
    ) -> Result<()> {
        if desc.irq >= self.num_irqs || virq >= self.num_irqs || priority > GIC_PRIORITY_MAX {
            return Err(Error::InvalidArgument);
        }

        match desc.owner {
            IrqOwner::Hypervisor => {
                log::warn!("GIC: IRQ {} is already used by the hypervisor", desc.irq);
                return Err(Error::ResourceBusy);
            }
            IrqOwner::Guest(owner) if owner != domain.id() || desc.virq != Some(virq) => {
                log::warn!(
                    "GIC: IRQ {} is already routed to {} as vIRQ {:?}",
                    desc.irq,
                    owner,
                    desc.virq
                );
                return Err(Error::ResourceBusy);
            }
            IrqOwner::Guest(_) => return Ok(()),
            IrqOwner::Unassigned => {}
        }

        self.program(desc.irq, priority as u8);
        desc.owner = IrqOwner::Guest(domain.id());
        desc.virq = Some(virq);
        desc.priority = priority;
        desc.status.remove(IrqStatus::HYPERVISOR);
        desc.status.insert(IrqStatus::GUEST);

        log::debug!("GIC: IRQ {} routed to {} as vIRQ {}", desc.irq, domain.id(), virq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::arm64::interrupt::sim::{SimBus, SimRegion};
    use crate::core::vmm::DomainId;
    use test_case::test_case;

    const GICD_BASE: u64 = 0x5004_1000;

    fn distributor(bus: &SimBus) -> GicDistributor<SimRegion> {
        // ITLinesNumber = 6: 224 interrupts
        bus.poke(GICD_BASE + gicd::TYPER as u64, 6);
        GicDistributor::map(&bus.mapper(), GICD_BASE, DtNodeId(2)).unwrap()
    }

    #[test]
    fn test_num_irqs_from_typer() {
        let bus = SimBus::new();
        let gic = distributor(&bus);
        assert_eq!(gic.num_irqs(), 224);
        assert_eq!(gic.node_id(), DtNodeId(2));
    }

    #[test]
    fn test_mapping_failure() {
        let bus = SimBus::new();
        bus.fail_mapping(GICD_BASE);
        assert!(GicDistributor::map(&bus.mapper(), GICD_BASE, DtNodeId(2)).is_none());
    }

    #[test]
    fn test_byte_fields_share_a_word() {
        let bus = SimBus::new();
        let gic = distributor(&bus);

        gic.set_priority(49, 0xa0);
        gic.set_priority(50, 0x80);
        gic.set_target(50, 1);

        assert_eq!(gic.priority(49), 0xa0);
        assert_eq!(gic.priority(50), 0x80);
        assert_eq!(bus.peek(GICD_BASE + 0x430), 0x0080_a000);
        assert_eq!(bus.peek(GICD_BASE + 0x830), 0x0001_0000);
    }

    #[test]
    fn test_enable_and_disable_irq() {
        let bus = SimBus::new();
        let gic = distributor(&bus);

        gic.enable_irq(50);
        gic.disable_irq(33);

        assert_eq!(bus.peek(GICD_BASE + 0x104), 1 << 18);
        assert_eq!(bus.peek(GICD_BASE + 0x184), 1 << 1);
    }

    #[test]
    fn test_route_to_hypervisor() {
        let bus = SimBus::new();
        let gic = distributor(&bus);
        let mut desc = IrqDesc::new(50);

        gic.route_irq_to_hypervisor(&mut desc, 0xa0);

        assert_eq!(desc.owner, IrqOwner::Hypervisor);
        assert!(desc.status.contains(IrqStatus::HYPERVISOR));
        assert_eq!(gic.priority(50), 0xa0);
        assert_eq!(gic.target(50), 1);
    }

    #[test]
    fn test_route_local_to_hypervisor_skips_target() {
        let bus = SimBus::new();
        let gic = distributor(&bus);
        let mut desc = IrqDesc::new(27);

        gic.route_irq_to_hypervisor(&mut desc, 0xa0);

        assert_eq!(gic.priority(27), 0xa0);
        assert_eq!(gic.target(27), 0);
    }

    #[test]
    fn test_route_to_guest() {
        let bus = SimBus::new();
        let gic = distributor(&bus);
        let guest = Domain::new(DomainId(1));
        let mut desc = IrqDesc::new(50);

        gic.route_irq_to_guest(&guest, 50, &mut desc, 0xa0).unwrap();

        assert_eq!(desc.owner, IrqOwner::Guest(DomainId(1)));
        assert_eq!(desc.virq, Some(50));
        assert!(desc.status.contains(IrqStatus::GUEST));
        // Same binding again is accepted
        assert_eq!(gic.route_irq_to_guest(&guest, 50, &mut desc, 0xa0), Ok(()));
    }

    #[test_case(IrqOwner::Hypervisor, 50; "hypervisor owned")]
    #[test_case(IrqOwner::Guest(DomainId(2)), 50; "other domain")]
    #[test_case(IrqOwner::Guest(DomainId(1)), 51; "same domain other virq")]
    fn test_route_to_guest_busy(owner: IrqOwner, virq: IrqNumber) {
        let bus = SimBus::new();
        let gic = distributor(&bus);
        let guest = Domain::new(DomainId(1));
        let mut desc = IrqDesc::new(50);
        desc.owner = owner;
        if let IrqOwner::Guest(_) = owner {
            desc.virq = Some(50);
        }

        assert_eq!(
            gic.route_irq_to_guest(&guest, virq, &mut desc, 0xa0),
            Err(Error::ResourceBusy)
        );
        assert_eq!(desc.owner, owner);
    }

    #[test_case(50, 50, 0x100; "priority too large")]
    #[test_case(224, 50, 0xa0; "irq beyond distributor")]
    #[test_case(50, 224, 0xa0; "virq beyond distributor")]
    fn test_route_to_guest_invalid(irq: IrqNumber, virq: IrqNumber, priority: u32) {
        let bus = SimBus::new();
        let gic = distributor(&bus);
        let guest = Domain::new(DomainId(1));
        let mut desc = IrqDesc::new(irq);

        assert_eq!(
            gic.route_irq_to_guest(&guest, virq, &mut desc, priority),
            Err(Error::InvalidArgument)
        );
        assert_eq!(desc.owner, IrqOwner::Unassigned);
    }
}
