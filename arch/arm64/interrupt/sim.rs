//! Simulated Tegra hardware for unit tests
//!
//! [`SimBus`] models the physical address space the platform layer touches:
//! the ictlr bank with working SET/CLR semantics, and plain storage
//! everywhere else (the PMC reset register, GIC registers). Every write is
//! logged with its physical address.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::vec::Vec;

use crate::arch::arm64::devtree::DtNodeId;
use crate::arch::arm64::interrupt::ictlr::regs;
use crate::arch::arm64::interrupt::PrimaryInterruptController;
use crate::arch::common::{IoMapper, MmioAccess};
use crate::config::TegraConfig;
use crate::core::irq::{IrqDesc, IrqNumber, IrqOwner, IrqStatus};
use crate::core::vmm::{Domain, DomainId};
use crate::{Error, Result};

#[derive(Default)]
struct IctlrState {
    ier: u32,
    class: u32,
    fir: u32,
    cop_ier: u32,
}

#[derive(Default)]
struct BusState {
    ictlr: [IctlrState; 6],
    ram: HashMap<u64, u32>,
    writes: Vec<(u64, u32)>,
    failing: Vec<u64>,
}

/// Shared handle to the simulated address space
#[derive(Clone, Default)]
pub struct SimBus {
    state: Rc<RefCell<BusState>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapper handing out regions of this bus
    pub fn mapper(&self) -> SimMapper {
        SimMapper { bus: self.clone() }
    }

    /// Make mappings starting at `phys` fail
    pub fn fail_mapping(&self, phys: u64) {
        self.state.borrow_mut().failing.push(phys);
    }

    /// Every write performed so far, in order
    pub fn writes(&self) -> Vec<(u64, u32)> {
        self.state.borrow().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.borrow_mut().writes.clear();
    }

    pub fn ictlr_enabled(&self, instance: usize) -> u32 {
        self.state.borrow().ictlr[instance].ier
    }

    pub fn set_ictlr_enabled(&self, instance: usize, value: u32) {
        self.state.borrow_mut().ictlr[instance].ier = value;
    }

    pub fn ictlr_class(&self, instance: usize) -> u32 {
        self.state.borrow().ictlr[instance].class
    }

    pub fn set_ictlr_class(&self, instance: usize, value: u32) {
        self.state.borrow_mut().ictlr[instance].class = value;
    }

    /// Raw storage outside the ictlr bank
    pub fn peek(&self, phys: u64) -> u32 {
        self.state.borrow().ram.get(&phys).copied().unwrap_or(0)
    }

    pub fn poke(&self, phys: u64, value: u32) {
        self.state.borrow_mut().ram.insert(phys, value);
    }

    fn ictlr_slot(phys: u64) -> Option<(usize, usize)> {
        let config = TegraConfig::DEFAULT;
        let end = config.ictlr_base + config.ictlr_window_size() as u64;
        if phys < config.ictlr_base || phys >= end {
            return None;
        }
        let offset = (phys - config.ictlr_base) as usize;
        Some((offset / config.ictlr_stride, offset % config.ictlr_stride))
    }

    fn read(&self, phys: u64) -> u32 {
        let state = self.state.borrow();
        match Self::ictlr_slot(phys) {
            Some((instance, reg)) => {
                let ictlr = &state.ictlr[instance];
                match reg {
                    regs::CPU_IER => ictlr.ier,
                    regs::CPU_IEP_CLASS => ictlr.class,
                    regs::CPU_IEP_FIR => ictlr.fir,
                    regs::COP_IER => ictlr.cop_ier,
                    r if regs::is_write_one_to_act(r) => 0,
                    _ => state.ram.get(&phys).copied().unwrap_or(0),
                }
            }
            None => state.ram.get(&phys).copied().unwrap_or(0),
        }
    }

    fn write(&self, phys: u64, value: u32) {
        let mut state = self.state.borrow_mut();
        state.writes.push((phys, value));
        match Self::ictlr_slot(phys) {
            Some((instance, reg)) => {
                let ictlr = &mut state.ictlr[instance];
                match reg {
                    regs::CPU_IER_SET => ictlr.ier |= value,
                    regs::CPU_IER_CLR => ictlr.ier &= !value,
                    regs::CPU_IEP_CLASS => ictlr.class = value,
                    regs::CPU_IEP_FIR_SET => ictlr.fir |= value,
                    regs::CPU_IEP_FIR_CLR => ictlr.fir &= !value,
                    regs::COP_IER_SET => ictlr.cop_ier |= value,
                    regs::COP_IER_CLR => ictlr.cop_ier &= !value,
                    _ => {
                        state.ram.insert(phys, value);
                    }
                }
            }
            None => {
                state.ram.insert(phys, value);
            }
        }
    }
}

/// Mapper over a [`SimBus`]
pub struct SimMapper {
    bus: SimBus,
}

impl IoMapper for SimMapper {
    type Region = SimRegion;

    fn ioremap_nocache(&self, phys: u64, size: usize) -> Option<SimRegion> {
        if self.bus.state.borrow().failing.contains(&phys) {
            return None;
        }
        Some(SimRegion { bus: self.bus.clone(), phys, size })
    }
}

/// A mapped range of the simulated bus
pub struct SimRegion {
    bus: SimBus,
    phys: u64,
    size: usize,
}

impl MmioAccess for SimRegion {
    fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.size);
        self.bus.read(self.phys + offset as u64)
    }

    fn write_u32(&self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.size);
        self.bus.write(self.phys + offset as u64, value);
    }
}

/// A call made into [`RecordingPic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicCall {
    Hypervisor { irq: IrqNumber, priority: u32 },
    Guest { domain: DomainId, virq: IrqNumber, irq: IrqNumber, priority: u32 },
}

/// Primary controller double that records bindings
pub struct RecordingPic {
    node: DtNodeId,
    calls: RefCell<Vec<PicCall>>,
    fail_with: Cell<Option<Error>>,
    bus: Option<SimBus>,
    writes_at_bind: RefCell<Vec<usize>>,
}

impl RecordingPic {
    pub fn new(phandle: u32) -> Self {
        Self {
            node: DtNodeId(phandle),
            calls: RefCell::new(Vec::new()),
            fail_with: Cell::new(None),
            bus: None,
            writes_at_bind: RefCell::new(Vec::new()),
        }
    }

    /// Also note how many bus writes had happened at each bind
    pub fn watching(phandle: u32, bus: &SimBus) -> Self {
        Self { bus: Some(bus.clone()), ..Self::new(phandle) }
    }

    pub fn fail_guest_routes(&self, err: Error) {
        self.fail_with.set(Some(err));
    }

    pub fn calls(&self) -> Vec<PicCall> {
        self.calls.borrow().clone()
    }

    pub fn writes_at_bind(&self) -> Vec<usize> {
        self.writes_at_bind.borrow().clone()
    }

    fn note_bind(&self, call: PicCall) {
        self.calls.borrow_mut().push(call);
        if let Some(bus) = &self.bus {
            self.writes_at_bind.borrow_mut().push(bus.writes().len());
        }
    }
}

impl PrimaryInterruptController for RecordingPic {
    fn node_id(&self) -> DtNodeId {
        self.node
    }

    fn route_irq_to_hypervisor(&self, desc: &mut IrqDesc, priority: u32) {
        self.note_bind(PicCall::Hypervisor { irq: desc.irq, priority });
        desc.owner = IrqOwner::Hypervisor;
        desc.priority = priority;
        desc.status.insert(IrqStatus::HYPERVISOR);
    }

    fn route_irq_to_guest(
        &self,
        domain: &Domain,
        virq: IrqNumber,
        desc: &mut IrqDesc,
        priority: u32,
    ) -> Result<()> {
        self.note_bind(PicCall::Guest { domain: domain.id(), virq, irq: desc.irq, priority });
        if let Some(err) = self.fail_with.get() {
            return Err(err);
        }
        desc.owner = IrqOwner::Guest(domain.id());
        desc.virq = Some(virq);
        desc.priority = priority;
        desc.status.insert(IrqStatus::GUEST);
        Ok(())
    }
}
