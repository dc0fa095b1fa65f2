//! Architecture-agnostic MMIO utilities and traits
//!
//! Device registers are reached through [`MmioAccess`]. Mappings are created
//! by an [`IoMapper`] and wrapped in a [`RegisterWindow`], which checks every
//! offset against the mapped size before touching the device.

use core::ptr::NonNull;
use volatile::VolatilePtr;

/// Memory-mapped I/O access trait
pub trait MmioAccess {
    /// Read a 32-bit value
    fn read_u32(&self, offset: usize) -> u32;

    /// Write a 32-bit value
    fn write_u32(&self, offset: usize, value: u32);
}

/// Creates uncached mappings of device memory
pub trait IoMapper {
    /// Region type handed out for a successful mapping
    type Region: MmioAccess;

    /// Map `size` bytes of device memory at physical address `phys`
    ///
    /// Returns `None` if the range cannot be mapped. Dropping the region
    /// releases the mapping.
    fn ioremap_nocache(&self, phys: u64, size: usize) -> Option<Self::Region>;
}

/// Simple MMIO region implementation
#[derive(Debug)]
pub struct MmioRegion {
    base: NonNull<u8>,
    size: usize,
}

impl MmioRegion {
    /// Create a new MMIO region
    ///
    /// # Safety
    /// `base` must point to `size` bytes of device memory that stay mapped
    /// for the lifetime of the region.
    pub const unsafe fn new(base: NonNull<u8>, size: usize) -> Self {
        Self { base, size }
    }

    /// Get the base address
    pub fn base_address(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Size of the region in bytes
    pub const fn size(&self) -> usize {
        self.size
    }

    fn register(&self, offset: usize) -> NonNull<u32> {
        debug_assert!(offset + 4 <= self.size);
        // SAFETY: offset lies inside the region per the check above.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)).cast() }
    }
}

impl MmioAccess for MmioRegion {
    fn read_u32(&self, offset: usize) -> u32 {
        // SAFETY: the region covers valid device memory (see `new`).
        unsafe { VolatilePtr::new(self.register(offset)) }.read()
    }

    fn write_u32(&self, offset: usize, value: u32) {
        // SAFETY: the region covers valid device memory (see `new`).
        unsafe { VolatilePtr::new(self.register(offset)) }.write(value);
        wmb();
    }
}

/// Mapper for the hypervisor's identity-mapped device space
///
/// The hypervisor maps the whole device aperture 1:1 with device attributes
/// at EL2, so "mapping" a range only has to produce a pointer to it.
#[derive(Debug)]
pub struct DirectMapper {
    _private: (),
}

impl DirectMapper {
    /// Create the mapper
    ///
    /// # Safety
    /// Physical device memory must be identity mapped, uncached, for the
    /// lifetime of every region this mapper produces.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl IoMapper for DirectMapper {
    type Region = MmioRegion;

    fn ioremap_nocache(&self, phys: u64, size: usize) -> Option<MmioRegion> {
        if size == 0 || phys.checked_add(size as u64).is_none() {
            return None;
        }
        let base = NonNull::new(usize::try_from(phys).ok()? as *mut u8)?;
        // SAFETY: identity mapping guaranteed by `DirectMapper::new`.
        Some(unsafe { MmioRegion::new(base, size) })
    }
}

/// A mapped block of device registers with bounds-checked access
#[derive(Debug)]
pub struct RegisterWindow<R: MmioAccess> {
    region: R,
    phys: u64,
    size: usize,
}

impl<R: MmioAccess> RegisterWindow<R> {
    /// Map `size` bytes at `phys` through `mapper`
    pub fn map<M>(mapper: &M, phys: u64, size: usize) -> Option<Self>
    where
        M: IoMapper<Region = R>,
    {
        let region = mapper.ioremap_nocache(phys, size)?;
        log::debug!("Mapped {:#x} bytes of device memory at {:#x}", size, phys);
        Some(Self { region, phys, size })
    }

    /// Physical base address of the window
    pub fn phys(&self) -> u64 {
        self.phys
    }

    /// Size of the window in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn check(&self, offset: usize) {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "register offset {:#x} outside {:#x}-byte window at {:#x}",
            offset,
            self.size,
            self.phys
        );
    }

    /// Read a 32-bit register
    pub fn read_u32(&self, offset: usize) -> u32 {
        self.check(offset);
        self.region.read_u32(offset)
    }

    /// Write a 32-bit register
    pub fn write_u32(&self, offset: usize, value: u32) {
        self.check(offset);
        self.region.write_u32(offset, value);
    }
}

/// Write memory barrier
#[inline]
pub fn wmb() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "aarch64")] {
            aarch64_cpu::asm::barrier::dsb(aarch64_cpu::asm::barrier::SY);
        } else {
            core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::arm64::interrupt::sim::SimBus;

    #[test]
    fn test_window_access() {
        let bus = SimBus::new();
        let window = RegisterWindow::map(&bus.mapper(), 0x1000_0000, 0x10).unwrap();

        window.write_u32(0x8, 0xdead_beef);
        assert_eq!(window.read_u32(0x8), 0xdead_beef);
        assert_eq!(window.phys(), 0x1000_0000);
        assert_eq!(window.size(), 0x10);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_window_out_of_bounds() {
        let bus = SimBus::new();
        let window = RegisterWindow::map(&bus.mapper(), 0x1000_0000, 0x10).unwrap();
        window.write_u32(0x10, 1);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_window_unaligned() {
        let bus = SimBus::new();
        let window = RegisterWindow::map(&bus.mapper(), 0x1000_0000, 0x10).unwrap();
        let _ = window.read_u32(0x2);
    }

    #[test]
    fn test_map_failure() {
        let bus = SimBus::new();
        bus.fail_mapping(0x1000_0000);
        assert!(RegisterWindow::map(&bus.mapper(), 0x1000_0000, 0x10).is_none());
    }

    #[test]
    fn test_direct_mapper_rejects_null() {
        let mapper = unsafe { DirectMapper::new() };
        assert!(mapper.ioremap_nocache(0, 0x100).is_none());
        assert!(mapper.ioremap_nocache(0x6000_4000, 0).is_none());
    }

    #[test]
    fn test_mmio_region_on_ram() {
        let mut backing = [0u32; 4];
        let base = NonNull::new(backing.as_mut_ptr() as *mut u8).unwrap();
        let region = unsafe { MmioRegion::new(base, 16) };

        region.write_u32(4, 0x1234);
        assert_eq!(region.read_u32(4), 0x1234);
        assert_eq!(region.size(), 16);
        drop(region);
        assert_eq!(backing[1], 0x1234);
    }
}
