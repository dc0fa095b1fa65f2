//! Mediated legacy interrupt controller (MLIC)
//!
//! The hardware domain drives most Tegra peripherals and expects to program
//! the ictlr for them. Its direct mapping of the bank is removed at boot and
//! replaced by a trap handler that only exposes the bits of interrupts
//! currently routed to the accessing domain. Everything else reads as zero
//! and ignores writes.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::arm64::interrupt::ictlr::{regs, Ictlr};
use crate::arch::common::MmioAccess;
use crate::core::irq::{IrqNumber, IrqTable};
use crate::core::vmm::{AccessSize, Domain, FrameRange, MmioBus, MmioHandler, MmioInfo};
use crate::{Error, Result};

/// Decoded target of a trapped ictlr access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MlicAccess {
    instance: usize,
    reg: usize,
    irq_base: IrqNumber,
}

/// Ictlr access mediator state
#[derive(Debug, Default)]
pub struct Mlic {
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Mlic {
    /// Create a mediator with zeroed counters
    pub const fn new() -> Self {
        Self {
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Trapped reads seen so far
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Trapped writes seen so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn decode<R: MmioAccess>(
        ictlr: &Ictlr<R>,
        domain: &Domain,
        info: &MmioInfo,
        what: &str,
    ) -> Result<MlicAccess> {
        let layout = ictlr.layout();
        let base = ictlr.phys_base();

        assert!(
            info.gpa >= base && info.gpa - base < layout.window_size() as u64,
            "MLIC: {:#x} is outside the ictlr bank",
            info.gpa
        );
        let offset = (info.gpa - base) as usize;
        let instance = offset / layout.stride;
        let reg = offset % layout.stride;
        assert!(instance < layout.count);

        if reg & 0x3 != 0 {
            log::error!(
                "{}: Tegra MLIC: unaligned {} of ictlr addr {:#x}",
                domain.id(),
                what,
                info.gpa
            );
            domain.crash();
            return Err(Error::InvalidAccess);
        }
        if info.size != AccessSize::Word {
            log::error!(
                "{}: Tegra MLIC: {}-byte {} of ictlr addr {:#x}",
                domain.id(),
                info.size.bytes(),
                what,
                info.gpa
            );
            domain.crash();
            return Err(Error::InvalidAccess);
        }

        Ok(MlicAccess {
            instance,
            reg,
            irq_base: layout.irq_base(instance),
        })
    }

    /// Bits of the instance starting at `irq_base` routed to `domain`
    fn owned_mask(irqs: &IrqTable, domain: &Domain, irq_base: IrqNumber, lines: u32) -> u32 {
        (0..lines)
            .filter(|bit| irqs.is_owned_by(irq_base + bit, domain.id()))
            .fold(0, |mask, bit| mask | (1 << bit))
    }

    /// Emulate a read of the ictlr bank by `domain`
    pub fn read<R: MmioAccess>(
        &self,
        ictlr: &Ictlr<R>,
        irqs: &IrqTable,
        domain: &Domain,
        info: &MmioInfo,
    ) -> Result<u32> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let access = Self::decode(ictlr, domain, info, "read")?;

        let per_instance = ictlr.layout().irqs_per_instance;
        let mask = Self::owned_mask(irqs, domain, access.irq_base, per_instance);
        let value = ictlr.read(access.instance, access.reg) & mask;

        log::trace!(
            "{}: Tegra MLIC: read ictlr {} reg {:#x} -> {:#010x}",
            domain.id(),
            access.instance,
            access.reg,
            value
        );
        Ok(value)
    }

    /// Emulate a write of the ictlr bank by `domain`
    ///
    /// Write-one-to-act registers receive only the owned bits of `value`.
    /// Other registers are read back so that bits the domain does not own
    /// keep their current state.
    pub fn write<R: MmioAccess>(
        &self,
        ictlr: &Ictlr<R>,
        irqs: &IrqTable,
        domain: &Domain,
        info: &MmioInfo,
        value: u32,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let access = Self::decode(ictlr, domain, info, "write")?;

        let per_instance = ictlr.layout().irqs_per_instance;
        let mask = Self::owned_mask(irqs, domain, access.irq_base, per_instance);
        let raw = if regs::is_write_one_to_act(access.reg) {
            value & mask
        } else {
            let current = ictlr.read(access.instance, access.reg);
            (current & !mask) | (value & mask)
        };

        log::trace!(
            "{}: Tegra MLIC: write ictlr {} reg {:#x} <- {:#010x} (mask {:#010x})",
            domain.id(),
            access.instance,
            access.reg,
            raw,
            mask
        );
        ictlr.write(access.instance, access.reg, raw);
        Ok(())
    }
}

/// Move the hardware domain's access to the ictlr bank behind `handler`
///
/// Revokes the domain's I/O memory permission for the frames covering
/// `[base, base + size)`, removes their identity stage-2 mapping and traps
/// the range to `handler`.
///
/// # Panics
/// If `domain` is not the hardware domain, or if its direct access cannot be
/// revoked.
pub fn hwdom_init<'h>(
    domain: &Domain,
    bus: &mut MmioBus<'h>,
    handler: &'h dyn MmioHandler,
    base: u64,
    size: usize,
) -> Result<()> {
    assert!(domain.is_hardware_domain());

    let frames = FrameRange::covering(base, size as u64);

    if domain.iomem_deny_access(frames.start, frames.end).is_err() {
        panic!("Failed to deny access to the Tegra LIC iomem");
    }

    if domain
        .unmap_mmio_regions(frames.start, frames.end - frames.start + 1, frames.start)
        .is_err()
    {
        panic!("Failed to deny access to the Tegra LIC");
    }

    bus.register_mmio_handler(handler, base, size as u64)?;

    log::info!(
        "{}: Tegra MLIC: mediating ictlr {:#x}-{:#x}",
        domain.id(),
        base,
        base + size as u64 - 1
    );
    Ok(())
}
