//! ARM64 (AArch64) Architecture Support
//!
//! This module provides the ARM64 pieces of Tegra interrupt routing:
//! - Device tree node model and match tables
//! - Interrupt controllers (GIC distributor, Tegra ictlr, ictlr mediator)
//! - Platform hooks and the platform registry
//!
//! ## References
//! - [ARM Generic Interrupt Controller Architecture Specification](https://developer.arm.com/documentation/ihi0048/latest)
//! - NVIDIA Tegra K1 / X1 Technical Reference Manuals

pub mod devtree;
pub mod interrupt;
pub mod platform;


// Re-export key types
pub use devtree::{DtNode, DtNodeId, RawIrq};
pub use interrupt::PrimaryInterruptController;
pub use platform::{Platform, PlatformDesc};

/// ARM64 architecture version
pub const ARCH_VERSION: &str = "arm64";
