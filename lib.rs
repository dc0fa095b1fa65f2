//! Tegravisor - Tegra platform support for the Ferrovisor hypervisor
//!
//! This crate provides the interrupt routing layer for NVIDIA Tegra K1/X1
//! systems, sitting beneath the hypervisor's GIC abstraction. It decides
//! which interrupt lines may be handed to guests or kept by the hypervisor,
//! and keeps the Tegra legacy interrupt controller (ictlr) consistent with
//! that decision.

#![cfg_attr(not(test), no_std)]

// Core modules
pub mod config;

// Architecture-specific code
pub mod arch;

// Core hypervisor modules
pub mod core;

pub use arch::arm64::platform::{Platform, PlatformDesc};
pub use arch::arm64::platform::tegra::Tegra;

use arch::arm64::devtree::DtNode;
use arch::arm64::interrupt::PrimaryInterruptController;
use arch::common::IoMapper;
use crate::core::irq::IrqTable;

/// Tegravisor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Platform bring-up
///
/// Resolves the platform for the machine node and runs its initialization
/// hook. Returns [`Error::NotFound`] when no registered platform claims the
/// machine.
pub fn init<'a, M, P>(
    machine: &DtNode<'_>,
    mapper: M,
    pic: P,
    irqs: &'a IrqTable,
) -> Result<Tegra<'a, M, P>>
where
    M: IoMapper,
    P: PrimaryInterruptController,
{
    let mut platform = Tegra::probe(machine, mapper, pic, irqs).ok_or(Error::NotFound)?;
    platform.initialize()?;

    log::info!("Tegravisor v{}: {} platform initialized", VERSION, platform.identify());

    Ok(platform)
}

/// Common error type for Tegravisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument
    InvalidArgument,
    /// Out of memory
    OutOfMemory,
    /// Not found
    NotFound,
    /// Resource busy
    ResourceBusy,
    /// Not initialized
    NotInitialized,
    /// Invalid state
    InvalidState,
    /// Guest performed an access the mediator refuses
    InvalidAccess,
}

impl Error {
    /// Negative errno equivalent, used as the numeric cause in logs
    pub const fn errno(self) -> i32 {
        match self {
            Error::InvalidArgument => -22,
            Error::OutOfMemory => -12,
            Error::NotFound => -2,
            Error::ResourceBusy => -16,
            Error::NotInitialized => -19,
            Error::InvalidState => -22,
            Error::InvalidAccess => -14,
        }
    }
}

impl ::core::fmt::Display for Error {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        let msg = match self {
            Error::InvalidArgument => "invalid argument",
            Error::OutOfMemory => "out of memory",
            Error::NotFound => "not found",
            Error::ResourceBusy => "resource busy",
            Error::NotInitialized => "not initialized",
            Error::InvalidState => "invalid state",
            Error::InvalidAccess => "invalid access",
        };
        f.write_str(msg)
    }
}

/// Result type alias
pub type Result<T> = ::core::result::Result<T, Error>;
