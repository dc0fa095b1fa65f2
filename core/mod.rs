//! Core hypervisor modules
//!
//! This module contains the pieces of the hypervisor core the platform
//! layer works against: interrupt descriptors, domains with their MMIO trap
//! table, and synchronization primitives.

pub mod irq;
pub mod sync;
pub mod vmm;
