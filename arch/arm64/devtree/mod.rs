//! ARM64 Device Tree Support
//!
//! The platform layer never parses a flattened device tree itself. It is
//! handed nodes that the device-tree code already unflattened and only asks
//! two questions of them: which node is this, and is it compatible with a
//! given string.

/// Device tree compatible strings used by the platform layer
pub mod compat {
    /// Tegra K1 machine
    pub const TEGRA120: &str = "nvidia,tegra120";
    /// Tegra X1 machine
    pub const TEGRA210: &str = "nvidia,tegra210";

    /// Tegra K1 legacy interrupt controller
    pub const TEGRA124_ICTLR: &str = "nvidia,tegra124-ictlr";
    /// Tegra X1 legacy interrupt controller
    pub const TEGRA210_ICTLR: &str = "nvidia,tegra210-ictlr";

    /// Tegra UARTs (all generations)
    pub const TEGRA20_UART: &str = "nvidia,tegra20-uart";

    /// ARM GICv2 interrupt controller
    pub const GIC_400: &str = "arm,gic-400";
    /// ARM Cortex-A15 GIC
    pub const CORTEX_A15_GIC: &str = "arm,cortex-a15-gic";
}

/// Identity of a device tree node (its phandle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DtNodeId(pub u32);

/// An unflattened device tree node
#[derive(Debug, Clone, Copy)]
pub struct DtNode<'a> {
    id: DtNodeId,
    path: &'a str,
    compatible: &'a [&'a str],
}

impl<'a> DtNode<'a> {
    /// Create a node description
    pub const fn new(phandle: u32, path: &'a str, compatible: &'a [&'a str]) -> Self {
        Self {
            id: DtNodeId(phandle),
            path,
            compatible,
        }
    }

    /// Node identity
    pub fn id(&self) -> DtNodeId {
        self.id
    }

    /// Full node path
    pub fn path(&self) -> &'a str {
        self.path
    }

    /// Entries of the `compatible` property, most specific first
    pub fn compatible(&self) -> &'a [&'a str] {
        self.compatible
    }

    /// Check whether the node is compatible with `compat` (exact match)
    pub fn is_compatible(&self, compat: &str) -> bool {
        self.compatible.iter().any(|c| *c == compat)
    }
}

/// An interrupt as described by the device tree: controller plus line
#[derive(Debug, Clone, Copy)]
pub struct RawIrq<'a> {
    /// Interrupt parent of the device
    pub controller: &'a DtNode<'a>,
    /// Line number in the controller's own numbering
    pub line: u32,
}

impl<'a> RawIrq<'a> {
    /// Create a raw interrupt description
    pub const fn new(controller: &'a DtNode<'a>, line: u32) -> Self {
        Self { controller, line }
    }
}

/// Entry of a device match table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMatch {
    /// Match nodes carrying this compatible string
    Compatible(&'static str),
    /// Match the node at exactly this path
    Path(&'static str),
}

impl DeviceMatch {
    /// Check a single node against this entry
    pub fn matches(&self, node: &DtNode<'_>) -> bool {
        match self {
            DeviceMatch::Compatible(compat) => node.is_compatible(compat),
            DeviceMatch::Path(path) => node.path() == *path,
        }
    }
}

/// Find the first entry of `table` matching `node`
pub fn match_node<'t>(table: &'t [DeviceMatch], node: &DtNode<'_>) -> Option<&'t DeviceMatch> {
    table.iter().find(|m| m.matches(node))
}
