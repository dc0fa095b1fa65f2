//! Domain management
//!
//! The subset of domain state the platform layer works with: identity,
//! hardware-domain privilege, I/O memory permissions, the identity stage-2
//! device mappings of the hardware domain, and the MMIO trap table.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::core::sync::SpinLock;
use crate::{Error, Result};

pub mod mmio;

pub use mmio::{AccessSize, MmioBus, MmioHandler, MmioInfo};

/// Page size (4KB)
pub const PAGE_SIZE: u64 = 4096;

/// Page shift
pub const PAGE_SHIFT: u64 = 12;

/// Maximum number of disjoint frame ranges tracked per domain
pub const MAX_FRAME_RANGES: usize = 16;

/// Domain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainId(pub u16);

impl core::fmt::Display for DomainId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Convert a physical address to a page frame number
pub const fn paddr_to_pfn(addr: u64) -> u64 {
    addr >> PAGE_SHIFT
}

/// Inclusive range of page frame numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    /// First frame
    pub start: u64,
    /// Last frame (inclusive)
    pub end: u64,
}

impl FrameRange {
    /// Create a new frame range
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Frames needed to cover `size` bytes at physical address `base`
    pub const fn covering(base: u64, size: u64) -> Self {
        Self {
            start: paddr_to_pfn(base),
            end: paddr_to_pfn(base + size - 1),
        }
    }

    fn overlaps(&self, other: &FrameRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Set of frame ranges with a fixed capacity
#[derive(Debug, Clone, Default)]
pub struct FrameRangeSet {
    ranges: heapless::Vec<FrameRange, MAX_FRAME_RANGES>,
}

impl FrameRangeSet {
    /// Create an empty set
    pub const fn new() -> Self {
        Self { ranges: heapless::Vec::new() }
    }

    /// Add a range to the set
    pub fn add(&mut self, range: FrameRange) -> Result<()> {
        if range.start > range.end {
            return Err(Error::InvalidArgument);
        }
        self.ranges.push(range).map_err(|_| Error::OutOfMemory)
    }

    /// Remove every frame of `range` from the set, splitting ranges as needed
    pub fn remove(&mut self, range: FrameRange) -> Result<()> {
        if range.start > range.end {
            return Err(Error::InvalidArgument);
        }

        let mut kept: heapless::Vec<FrameRange, MAX_FRAME_RANGES> = heapless::Vec::new();
        for r in self.ranges.iter().filter(|r| r.overlaps(&range)) {
            if r.start < range.start {
                kept.push(FrameRange::new(r.start, range.start - 1))
                    .map_err(|_| Error::OutOfMemory)?;
            }
            if r.end > range.end {
                kept.push(FrameRange::new(range.end + 1, r.end))
                    .map_err(|_| Error::OutOfMemory)?;
            }
        }

        let untouched = self.ranges.iter().filter(|r| !r.overlaps(&range)).count();
        if untouched + kept.len() > MAX_FRAME_RANGES {
            return Err(Error::OutOfMemory);
        }

        self.ranges.retain(|r| !r.overlaps(&range));
        for r in kept {
            // Capacity was checked above
            let _ = self.ranges.push(r);
        }
        Ok(())
    }

    /// Check whether a frame is in the set
    pub fn contains(&self, pfn: u64) -> bool {
        self.ranges.iter().any(|r| r.start <= pfn && pfn <= r.end)
    }

    /// Check whether any frame of `range` is in the set
    pub fn intersects(&self, range: FrameRange) -> bool {
        self.ranges.iter().any(|r| r.overlaps(&range))
    }
}

/// A domain (virtual machine)
#[derive(Debug)]
pub struct Domain {
    id: DomainId,
    hardware: bool,
    crashed: AtomicBool,
    /// Frames the domain may be given access to
    iomem_caps: SpinLock<FrameRangeSet>,
    /// Frames identity-mapped into the domain's stage-2 tables
    mmio_mappings: SpinLock<FrameRangeSet>,
}

impl Domain {
    /// Create an unprivileged guest domain
    pub fn new(id: DomainId) -> Self {
        Self {
            id,
            hardware: false,
            crashed: AtomicBool::new(false),
            iomem_caps: SpinLock::new(FrameRangeSet::new()),
            mmio_mappings: SpinLock::new(FrameRangeSet::new()),
        }
    }

    /// Create the hardware domain
    ///
    /// The hardware domain starts with access to, and an identity mapping
    /// of, every frame in `device_frames`.
    pub fn new_hardware(id: DomainId, device_frames: FrameRange) -> Result<Self> {
        let domain = Self { hardware: true, ..Self::new(id) };
        domain.iomem_caps.lock().add(device_frames)?;
        domain.mmio_mappings.lock().add(device_frames)?;
        Ok(domain)
    }

    /// Get domain ID
    pub fn id(&self) -> DomainId {
        self.id
    }

    /// Check whether this is the hardware domain
    pub fn is_hardware_domain(&self) -> bool {
        self.hardware
    }

    /// Mark the domain as crashed
    pub fn crash(&self) {
        if !self.crashed.swap(true, Ordering::AcqRel) {
            log::error!("{}: domain crashed", self.id);
        }
    }

    /// Check whether the domain has crashed
    pub fn is_crashed(&self) -> bool {
        self.crashed.load(Ordering::Acquire)
    }

    /// Grant the domain access to a range of frames
    pub fn iomem_permit_access(&self, start: u64, end: u64) -> Result<()> {
        self.iomem_caps.lock().add(FrameRange::new(start, end))
    }

    /// Revoke the domain's access to a range of frames
    pub fn iomem_deny_access(&self, start: u64, end: u64) -> Result<()> {
        self.iomem_caps.lock().remove(FrameRange::new(start, end))
    }

    /// Check whether the domain may access a frame
    pub fn iomem_access_permitted(&self, pfn: u64) -> bool {
        self.iomem_caps.lock().contains(pfn)
    }

    /// Remove `nr` frames of device mapping starting at `gfn`
    ///
    /// Device memory is identity mapped, so `mfn` must equal `gfn`.
    pub fn unmap_mmio_regions(&self, gfn: u64, nr: u64, mfn: u64) -> Result<()> {
        if nr == 0 || gfn != mfn {
            return Err(Error::InvalidArgument);
        }
        self.mmio_mappings.lock().remove(FrameRange::new(gfn, gfn + nr - 1))
    }

    /// Check whether a frame is mapped into the domain's stage-2 tables
    pub fn is_mmio_mapped(&self, gfn: u64) -> bool {
        self.mmio_mappings.lock().contains(gfn)
    }
}
