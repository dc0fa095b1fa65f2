//! Configuration management
//!
//! This module holds the platform configuration for the Tegra interrupt
//! layer: where the legacy interrupt controller bank and the reset register
//! live, and how interrupt numbers map onto ictlr instances.

use crate::{Error, Result};

/// Number of interrupts below which no ictlr is involved (SGIs and PPIs)
pub const NR_LOCAL_IRQS: u32 = 32;

/// Tegra platform configuration structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TegraConfig {
    /// Physical base of the first ictlr instance
    pub ictlr_base: u64,
    /// Size of one ictlr instance's register block
    pub ictlr_stride: usize,
    /// Number of ictlr instances in the bank
    pub ictlr_count: usize,
    /// Interrupt lines handled by each instance
    pub irqs_per_ictlr: u32,
    /// First interrupt number mediated by the ictlr bank
    pub first_ictlr_irq: u32,
    /// Physical address of the PMC control register
    pub reset_base: u64,
    /// Size of the reset register mapping
    pub reset_size: usize,
}

impl TegraConfig {
    /// Tegra K1 / X1 defaults
    pub const DEFAULT: Self = Self {
        ictlr_base: 0x6000_4000,
        ictlr_stride: 0x100,
        ictlr_count: 6,
        irqs_per_ictlr: 32,
        first_ictlr_irq: NR_LOCAL_IRQS,
        reset_base: 0x7000_e400,
        reset_size: 4,
    };

    /// Total size of the ictlr bank mapping
    pub const fn ictlr_window_size(&self) -> usize {
        self.ictlr_stride * self.ictlr_count
    }

    /// One past the last interrupt number covered by the ictlr bank
    pub const fn ictlr_irq_end(&self) -> u32 {
        self.first_ictlr_irq + self.irqs_per_ictlr * self.ictlr_count as u32
    }
}

impl Default for TegraConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Validate a platform configuration
pub fn validate_tegra_config(config: &TegraConfig) -> Result<()> {
    if config.ictlr_count == 0 {
        return Err(Error::InvalidArgument);
    }

    // Every instance needs room for the CPU and COP register groups
    if config.ictlr_stride < 0x40 || config.ictlr_stride % 4 != 0 {
        return Err(Error::InvalidArgument);
    }

    if config.irqs_per_ictlr == 0 || config.irqs_per_ictlr > 32 {
        return Err(Error::InvalidArgument);
    }

    // The bank must fit in the address space and its lines in the irq space
    let window_size = match config.ictlr_stride.checked_mul(config.ictlr_count) {
        Some(size) => size,
        None => return Err(Error::InvalidArgument),
    };
    if config.ictlr_base.checked_add(window_size as u64).is_none() {
        return Err(Error::InvalidArgument);
    }

    let irq_end = u32::try_from(config.ictlr_count)
        .ok()
        .and_then(|count| config.irqs_per_ictlr.checked_mul(count))
        .and_then(|lines| config.first_ictlr_irq.checked_add(lines));
    if irq_end.is_none() {
        return Err(Error::InvalidArgument);
    }

    if config.reset_size < 4 {
        return Err(Error::InvalidArgument);
    }

    Ok(())
}
