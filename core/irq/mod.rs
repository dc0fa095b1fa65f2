//! Interrupt descriptors
//!
//! Every physical interrupt line has an [`IrqDesc`] recording who it is
//! routed to. Descriptors live in an [`IrqTable`], one spinlock each; routing
//! code runs with the descriptor lock held.

use crate::core::sync::SpinLock;
use crate::core::vmm::DomainId;

/// Interrupt number type
pub type IrqNumber = u32;

/// Number of interrupt descriptors the table holds (GIC architectural limit)
pub const NR_IRQS: usize = 1020;

bitflags::bitflags! {
    /// Interrupt descriptor status flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqStatus: u32 {
        /// Line is masked at the primary controller
        const DISABLED = 1 << 0;
        /// Line is routed to a guest domain
        const GUEST = 1 << 1;
        /// Line is in use by the hypervisor itself
        const HYPERVISOR = 1 << 2;
    }
}

/// Consumer an interrupt is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IrqOwner {
    /// Not routed anywhere yet
    #[default]
    Unassigned,
    /// Delivered to the hypervisor
    Hypervisor,
    /// Delivered to a guest domain
    Guest(DomainId),
}

/// Interrupt descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqDesc {
    /// Global interrupt number
    pub irq: IrqNumber,
    /// Priority programmed at the primary controller
    pub priority: u32,
    /// Routing owner
    pub owner: IrqOwner,
    /// Virtual interrupt number seen by the owning guest
    pub virq: Option<IrqNumber>,
    /// Status flags
    pub status: IrqStatus,
}

impl IrqDesc {
    /// Create a new, unrouted interrupt descriptor
    pub const fn new(irq: IrqNumber) -> Self {
        Self {
            irq,
            priority: 0,
            owner: IrqOwner::Unassigned,
            virq: None,
            status: IrqStatus::DISABLED,
        }
    }

    /// Domain this interrupt is routed to, if it belongs to a guest
    pub fn domain_id(&self) -> Option<DomainId> {
        match self.owner {
            IrqOwner::Guest(id) => Some(id),
            _ => None,
        }
    }

    /// Check whether the interrupt is routed to the given domain
    pub fn is_owned_by(&self, domain: DomainId) -> bool {
        self.domain_id() == Some(domain)
    }
}

/// Table of all interrupt descriptors
pub struct IrqTable {
    descs: [SpinLock<IrqDesc>; NR_IRQS],
}

impl IrqTable {
    /// Create a table with every descriptor unrouted
    ///
    /// Usable in a `static`, which is where the hypervisor keeps its table.
    pub const fn new() -> Self {
        const UNROUTED: SpinLock<IrqDesc> = SpinLock::new(IrqDesc::new(0));

        let mut descs = [UNROUTED; NR_IRQS];
        let mut irq = 0;
        while irq < NR_IRQS {
            descs[irq] = SpinLock::new(IrqDesc::new(irq as IrqNumber));
            irq += 1;
        }

        Self { descs }
    }

    /// Look up the descriptor of an interrupt
    pub fn irq_to_desc(&self, irq: IrqNumber) -> Option<&SpinLock<IrqDesc>> {
        self.descs.get(irq as usize)
    }

    /// Domain an interrupt is currently routed to
    pub fn domain_of(&self, irq: IrqNumber) -> Option<DomainId> {
        self.irq_to_desc(irq).and_then(|desc| desc.lock().domain_id())
    }

    /// Check whether an interrupt is currently routed to the given domain
    pub fn is_owned_by(&self, irq: IrqNumber, domain: DomainId) -> bool {
        self.domain_of(irq) == Some(domain)
    }
}

impl Default for IrqTable {
    fn default() -> Self {
        Self::new()
    }
}
