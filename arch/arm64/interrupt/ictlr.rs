//! Tegra legacy interrupt controller (ictlr)
//!
//! Tegra SoCs place a bank of legacy interrupt controllers between the
//! peripheral interrupt lines and the GIC. Each instance masks 32 lines and
//! exposes paired SET/CLR registers, so single lines can be enabled or
//! disabled with one write and no read-modify-write.
//!
//! Interrupts below [`NR_LOCAL_IRQS`](crate::config::NR_LOCAL_IRQS) (SGIs and
//! PPIs) never pass through the ictlr.
//!
//! Reference: Tegra K1/X1 TRM, "Legacy Interrupt Controller"

use crate::arch::common::{IoMapper, MmioAccess, RegisterWindow};
use crate::config::TegraConfig;
use crate::core::irq::IrqNumber;

/// Per-instance register offsets
pub mod regs {
    /// Virtual IRQ status for the CPU
    pub const VIRQ_CPU: usize = 0x00;
    /// Virtual IRQ status for the COP
    pub const VIRQ_COP: usize = 0x04;
    /// Virtual FIQ status for the CPU
    pub const VFIQ_CPU: usize = 0x08;
    /// Virtual FIQ status for the COP
    pub const VFIQ_COP: usize = 0x0c;
    /// Raw interrupt status
    pub const ISR: usize = 0x10;
    /// Forced interrupt status
    pub const CPU_IEP_FIR: usize = 0x14;
    /// Force interrupt (write one to set)
    pub const CPU_IEP_FIR_SET: usize = 0x18;
    /// Release forced interrupt (write one to clear)
    pub const CPU_IEP_FIR_CLR: usize = 0x1c;
    /// CPU interrupt enable state
    pub const CPU_IER: usize = 0x20;
    /// CPU interrupt enable (write one to set)
    pub const CPU_IER_SET: usize = 0x24;
    /// CPU interrupt disable (write one to clear)
    pub const CPU_IER_CLR: usize = 0x28;
    /// CPU interrupt class: 0 = IRQ, 1 = FIQ
    pub const CPU_IEP_CLASS: usize = 0x2c;
    /// COP interrupt enable state
    pub const COP_IER: usize = 0x30;
    /// COP interrupt enable (write one to set)
    pub const COP_IER_SET: usize = 0x34;
    /// COP interrupt disable (write one to clear)
    pub const COP_IER_CLR: usize = 0x38;
    /// COP interrupt class
    pub const COP_IEP_CLASS: usize = 0x3c;

    /// Whether a register acts on the bits written as one and ignores zeros
    pub const fn is_write_one_to_act(reg: usize) -> bool {
        matches!(
            reg,
            CPU_IEP_FIR_SET
                | CPU_IEP_FIR_CLR
                | CPU_IER_SET
                | CPU_IER_CLR
                | COP_IER_SET
                | COP_IER_CLR
        )
    }
}

/// Geometry of the ictlr bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IctlrLayout {
    /// Bytes between consecutive instances
    pub stride: usize,
    /// Number of instances
    pub count: usize,
    /// Lines per instance
    pub irqs_per_instance: u32,
    /// Global number of the first line of instance 0
    pub first_irq: IrqNumber,
}

/// Position of an interrupt line inside the ictlr bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IctlrLine {
    /// Instance index
    pub instance: usize,
    /// Bit within the instance
    pub bit: u32,
}

impl IctlrLine {
    /// Single-bit mask for this line
    pub const fn mask(&self) -> u32 {
        1 << self.bit
    }
}

impl IctlrLayout {
    /// Layout described by a platform configuration
    pub const fn from_config(config: &TegraConfig) -> Self {
        Self {
            stride: config.ictlr_stride,
            count: config.ictlr_count,
            irqs_per_instance: config.irqs_per_ictlr,
            first_irq: config.first_ictlr_irq,
        }
    }

    /// Size of the register window covering every instance
    pub const fn window_size(&self) -> usize {
        self.stride * self.count
    }

    /// Whether an interrupt number lies above the local range
    pub const fn is_mediated(&self, irq: IrqNumber) -> bool {
        irq >= self.first_irq
    }

    /// Locate the instance and bit owning `irq`
    ///
    /// # Panics
    /// If `irq` is a local interrupt or lies beyond the last instance. Both
    /// mean the platform description and the interrupt numbering disagree.
    pub fn locate(&self, irq: IrqNumber) -> IctlrLine {
        assert!(
            self.is_mediated(irq),
            "IRQ {} is local and not handled by the ictlr",
            irq
        );

        let ictlr_irq = irq - self.first_irq;
        let instance = (ictlr_irq / self.irqs_per_instance) as usize;
        assert!(
            instance < self.count,
            "IRQ {} maps to ictlr {} but only {} are present",
            irq,
            instance,
            self.count
        );

        IctlrLine {
            instance,
            bit: ictlr_irq % self.irqs_per_instance,
        }
    }

    /// Global number of the first line of `instance`
    pub fn irq_base(&self, instance: usize) -> IrqNumber {
        self.first_irq + instance as IrqNumber * self.irqs_per_instance
    }

    /// Byte offset of register `reg` of `instance` inside the window
    pub fn register_offset(&self, instance: usize, reg: usize) -> usize {
        assert!(instance < self.count, "ictlr {} out of range", instance);
        assert!(reg < self.stride, "ictlr register {:#x} out of range", reg);
        self.stride * instance + reg
    }
}

/// The mapped ictlr bank
#[derive(Debug)]
pub struct Ictlr<R: MmioAccess> {
    window: RegisterWindow<R>,
    layout: IctlrLayout,
}

impl<R: MmioAccess> Ictlr<R> {
    /// Map the ictlr bank at physical address `base`
    pub fn map<M>(mapper: &M, base: u64, layout: IctlrLayout) -> Option<Self>
    where
        M: IoMapper<Region = R>,
    {
        let window = RegisterWindow::map(mapper, base, layout.window_size())?;
        Some(Self { window, layout })
    }

    /// Bank geometry
    pub fn layout(&self) -> &IctlrLayout {
        &self.layout
    }

    /// Physical base of the bank
    pub fn phys_base(&self) -> u64 {
        self.window.phys()
    }

    /// Read register `reg` of `instance`
    pub fn read(&self, instance: usize, reg: usize) -> u32 {
        self.window.read_u32(self.layout.register_offset(instance, reg))
    }

    /// Write register `reg` of `instance`
    pub fn write(&self, instance: usize, reg: usize, value: u32) {
        self.window.write_u32(self.layout.register_offset(instance, reg), value);
    }

    /// Enable or disable a single interrupt line
    ///
    /// Uses the SET register to enable and the CLR register to disable, so
    /// no other line of the instance is touched.
    ///
    /// # Panics
    /// If `irq` is not handled by the ictlr bank (see [`IctlrLayout::locate`]).
    pub fn set_interrupt_enable(&self, irq: IrqNumber, enabled: bool) {
        let reg = if enabled { regs::CPU_IER_SET } else { regs::CPU_IER_CLR };
        let line = self.layout.locate(irq);

        log::trace!(
            "Tegra LIC: {} IRQ {} (ictlr {}, bit {})",
            if enabled { "enabling" } else { "disabling" },
            irq,
            line.instance,
            line.bit
        );

        self.write(line.instance, reg, line.mask());
    }

    /// Check whether a line is enabled at the CPU interface
    pub fn is_interrupt_enabled(&self, irq: IrqNumber) -> bool {
        let line = self.layout.locate(irq);
        self.read(line.instance, regs::CPU_IER) & line.mask() != 0
    }

    /// Put every instance into its boot default
    ///
    /// Disables every line and marks every line as a normal IRQ rather
    /// than a fast interrupt, so nothing reaches the GIC through the ictlr
    /// until it is explicitly routed.
    pub fn reset(&self) {
        for instance in 0..self.layout.count {
            self.write(instance, regs::CPU_IER_CLR, !0);
            self.write(instance, regs::CPU_IEP_CLASS, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::arm64::interrupt::sim::{SimBus, SimRegion};
    use test_case::test_case;

    const BASE: u64 = 0x6000_4000;

    fn layout() -> IctlrLayout {
        IctlrLayout::from_config(&TegraConfig::DEFAULT)
    }

    fn mapped(bus: &SimBus) -> Ictlr<SimRegion> {
        Ictlr::map(&bus.mapper(), BASE, layout()).unwrap()
    }

    #[test_case(32, 0, 0; "first mediated line")]
    #[test_case(50, 0, 18; "irq 50")]
    #[test_case(63, 0, 31; "last line of instance 0")]
    #[test_case(64, 1, 0; "first line of instance 1")]
    #[test_case(223, 5, 31; "last line of the bank")]
    fn test_locate(irq: IrqNumber, instance: usize, bit: u32) {
        assert_eq!(layout().locate(irq), IctlrLine { instance, bit });
    }

    #[test]
    #[should_panic(expected = "is local")]
    fn test_locate_local_irq() {
        layout().locate(10);
    }

    #[test]
    #[should_panic(expected = "only 6 are present")]
    fn test_locate_beyond_bank() {
        layout().locate(224);
    }

    #[test]
    fn test_layout_helpers() {
        let layout = layout();
        assert_eq!(layout.window_size(), 0x600);
        assert_eq!(layout.irq_base(0), 32);
        assert_eq!(layout.irq_base(5), 192);
        assert_eq!(layout.register_offset(2, regs::CPU_IER_SET), 0x224);
        assert!(!layout.is_mediated(31));
        assert!(layout.is_mediated(32));
    }

    #[test]
    fn test_write_one_to_act_registers() {
        assert!(regs::is_write_one_to_act(regs::CPU_IER_SET));
        assert!(regs::is_write_one_to_act(regs::COP_IER_CLR));
        assert!(!regs::is_write_one_to_act(regs::CPU_IER));
        assert!(!regs::is_write_one_to_act(regs::CPU_IEP_CLASS));
    }

    #[test]
    fn test_enable_writes_single_bit_to_set() {
        let bus = SimBus::new();
        let ictlr = mapped(&bus);

        ictlr.set_interrupt_enable(50, true);

        assert_eq!(bus.writes(), vec![(BASE + regs::CPU_IER_SET as u64, 1 << 18)]);
        assert_eq!(bus.ictlr_enabled(0), 1 << 18);
    }

    #[test]
    fn test_disable_writes_single_bit_to_clr() {
        let bus = SimBus::new();
        let ictlr = mapped(&bus);

        ictlr.set_interrupt_enable(100, false);

        // IRQ 100 is instance 2, bit 4
        assert_eq!(bus.writes(), vec![(BASE + 0x200 + regs::CPU_IER_CLR as u64, 1 << 4)]);
    }

    #[test]
    fn test_enable_is_idempotent() {
        let bus = SimBus::new();
        let ictlr = mapped(&bus);

        ictlr.set_interrupt_enable(70, true);
        let once = bus.ictlr_enabled(1);
        ictlr.set_interrupt_enable(70, true);

        assert_eq!(bus.ictlr_enabled(1), once);
        assert_eq!(once, 1 << 6);
    }

    #[test]
    fn test_enable_disable_leaves_other_bits() {
        let bus = SimBus::new();
        let ictlr = mapped(&bus);
        bus.set_ictlr_enabled(0, 0x8000_0005);

        ictlr.set_interrupt_enable(50, true);
        assert!(ictlr.is_interrupt_enabled(50));
        ictlr.set_interrupt_enable(50, false);

        assert!(!ictlr.is_interrupt_enabled(50));
        assert_eq!(bus.ictlr_enabled(0), 0x8000_0005);
    }

    #[test]
    fn test_reset_every_instance() {
        let bus = SimBus::new();
        let ictlr = mapped(&bus);
        for instance in 0..6 {
            bus.set_ictlr_enabled(instance, 0xffff_ffff);
            bus.set_ictlr_class(instance, 0x0000_ff00);
        }

        ictlr.reset();

        for instance in 0..6 {
            let base = BASE + 0x100 * instance as u64;
            assert!(bus.writes().contains(&(base + regs::CPU_IER_CLR as u64, !0)));
            assert!(bus.writes().contains(&(base + regs::CPU_IEP_CLASS as u64, 0)));
            assert_eq!(bus.ictlr_enabled(instance), 0);
            assert_eq!(bus.ictlr_class(instance), 0);
        }
        assert_eq!(bus.writes().len(), 12);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_register_beyond_instance() {
        let bus = SimBus::new();
        let ictlr = mapped(&bus);
        ictlr.write(6, regs::CPU_IER_SET, 1);
    }
}
