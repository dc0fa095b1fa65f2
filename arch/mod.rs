//! Architecture support
//!
//! The arm64 tree only touches hardware through [`common::MmioAccess`], so it
//! is built on every target and exercised on the host by the unit tests.

pub mod arm64;
pub mod common;
