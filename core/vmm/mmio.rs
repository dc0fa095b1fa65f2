//! Trapped MMIO dispatch
//!
//! Stage-2 data aborts on emulated or mediated device ranges end up here.
//! Each domain owns an [`MmioBus`] that routes the access to the handler
//! registered for the faulting guest physical address.

use crate::core::vmm::Domain;
use crate::{Error, Result};

/// Maximum number of trapped ranges per domain
pub const MAX_MMIO_HANDLERS: usize = 8;

/// Width of a trapped access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    /// 8-bit access
    Byte,
    /// 16-bit access
    Half,
    /// 32-bit access
    Word,
    /// 64-bit access
    Double,
}

impl AccessSize {
    /// Decode the SAS field of a data abort syndrome
    pub const fn from_sas(sas: u8) -> Self {
        match sas & 0x3 {
            0 => Self::Byte,
            1 => Self::Half,
            2 => Self::Word,
            _ => Self::Double,
        }
    }

    /// Access width in bytes
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
            Self::Double => 8,
        }
    }
}

/// Decoded information about a trapped access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioInfo {
    /// Faulting guest physical address
    pub gpa: u64,
    /// Access width
    pub size: AccessSize,
}

impl MmioInfo {
    /// Create access information
    pub const fn new(gpa: u64, size: AccessSize) -> Self {
        Self { gpa, size }
    }
}

/// Handler for a trapped MMIO range
pub trait MmioHandler {
    /// Emulate a read, returning the value for the guest register
    fn read(&self, domain: &Domain, info: &MmioInfo) -> Result<u32>;

    /// Emulate a write of `value`
    fn write(&self, domain: &Domain, info: &MmioInfo, value: u32) -> Result<()>;
}

struct MmioTrap<'h> {
    base: u64,
    size: u64,
    handler: &'h dyn MmioHandler,
}

impl MmioTrap<'_> {
    fn covers(&self, gpa: u64) -> bool {
        gpa >= self.base && gpa - self.base < self.size
    }
}

/// Per-domain table of trapped MMIO ranges
pub struct MmioBus<'h> {
    traps: heapless::Vec<MmioTrap<'h>, MAX_MMIO_HANDLERS>,
}

impl<'h> MmioBus<'h> {
    /// Create an empty bus
    pub const fn new() -> Self {
        Self { traps: heapless::Vec::new() }
    }

    /// Register a handler for `[base, base + size)`
    pub fn register_mmio_handler(
        &mut self,
        handler: &'h dyn MmioHandler,
        base: u64,
        size: u64,
    ) -> Result<()> {
        if size == 0 || base.checked_add(size).is_none() {
            return Err(Error::InvalidArgument);
        }
        if self
            .traps
            .iter()
            .any(|t| base < t.base + t.size && t.base < base + size)
        {
            return Err(Error::ResourceBusy);
        }

        self.traps
            .push(MmioTrap { base, size, handler })
            .map_err(|_| Error::OutOfMemory)?;
        log::debug!("Registered MMIO handler for {:#x}-{:#x}", base, base + size - 1);
        Ok(())
    }

    /// Check whether an address is trapped
    pub fn is_trapped(&self, gpa: u64) -> bool {
        self.find(gpa).is_some()
    }

    fn find(&self, gpa: u64) -> Option<&MmioTrap<'h>> {
        self.traps.iter().find(|t| t.covers(gpa))
    }

    /// Dispatch a trapped read
    pub fn handle_read(&self, domain: &Domain, info: &MmioInfo) -> Result<u32> {
        let trap = self.find(info.gpa).ok_or(Error::NotFound)?;
        trap.handler.read(domain, info)
    }

    /// Dispatch a trapped write
    pub fn handle_write(&self, domain: &Domain, info: &MmioInfo, value: u32) -> Result<()> {
        let trap = self.find(info.gpa).ok_or(Error::NotFound)?;
        trap.handler.write(domain, info, value)
    }
}

impl Default for MmioBus<'_> {
    fn default() -> Self {
        Self::new()
    }
}
