//! NVIDIA Tegra K1/X1 platform
//!
//! Tegra places its legacy interrupt controllers (ictlr) in front of the
//! GIC: a peripheral interrupt only reaches the GIC while its ictlr enable
//! bit is set. Routing therefore always has two halves. The GIC binding is
//! made first, then the ictlr line is enabled or disabled to match the new
//! consumer.
//!
//! Lines routed to the hardware domain stay disabled in the ictlr. That
//! domain manages its own lines through the mediated view of the bank (see
//! [`mlic`](crate::arch::arm64::interrupt::mlic)).

use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::arch::arm64::devtree::{compat, match_node, DeviceMatch, DtNode, RawIrq};
use crate::arch::arm64::interrupt::{Ictlr, IctlrLayout, PrimaryInterruptController};
use crate::arch::arm64::platform::{self, Platform, PlatformDesc};
use crate::arch::common::{IoMapper, RegisterWindow};
use crate::config::{validate_tegra_config, TegraConfig};
use crate::core::irq::{IrqDesc, IrqNumber, IrqTable};
use crate::core::vmm::Domain;
use crate::{Error, Result};

#[cfg(feature = "mlic")]
use crate::arch::arm64::interrupt::mlic::{self, Mlic};
#[cfg(feature = "mlic")]
use crate::core::vmm::{MmioBus, MmioHandler, MmioInfo};

register_bitfields![u32,
    /// PMC control register
    PMC_CNTRL [
        /// Writing one resets the whole chip
        MAIN_RST OFFSET(4) NUMBITS(1) []
    ]
];

/// Ictlr variants the hypervisor knows how to drive
static TEGRA_ICTLR_MATCH: [DeviceMatch; 2] = [
    DeviceMatch::Compatible(compat::TEGRA124_ICTLR),
    DeviceMatch::Compatible(compat::TEGRA210_ICTLR),
];

/// Tegra platform descriptor
pub static TEGRA_DESC: PlatformDesc = PlatformDesc {
    name: "Tegra",
    compatible: &[compat::TEGRA120, compat::TEGRA210],
    // The UARTs are used by the hypervisor console
    blacklist_dev: &[DeviceMatch::Compatible(compat::TEGRA20_UART)],
};

/// Tegra platform instance
pub struct Tegra<'a, M: IoMapper, P: PrimaryInterruptController> {
    mapper: M,
    pic: P,
    #[cfg_attr(not(feature = "mlic"), allow(dead_code))]
    irqs: &'a IrqTable,
    config: TegraConfig,
    ictlr: Option<Ictlr<M::Region>>,
    #[cfg(feature = "mlic")]
    mlic: Mlic,
}

impl<'a, M: IoMapper, P: PrimaryInterruptController> Tegra<'a, M, P> {
    /// Create the platform with the SoC default layout
    pub fn new(mapper: M, pic: P, irqs: &'a IrqTable) -> Self {
        Self {
            mapper,
            pic,
            irqs,
            config: TegraConfig::DEFAULT,
            ictlr: None,
            #[cfg(feature = "mlic")]
            mlic: Mlic::new(),
        }
    }

    /// Create the platform with a custom layout
    pub fn with_config(mapper: M, pic: P, irqs: &'a IrqTable, config: TegraConfig) -> Result<Self> {
        validate_tegra_config(&config)?;
        Ok(Self { config, ..Self::new(mapper, pic, irqs) })
    }

    /// Create the platform if the registry resolves `machine` to Tegra
    pub fn probe(machine: &DtNode<'_>, mapper: M, pic: P, irqs: &'a IrqTable) -> Option<Self> {
        let desc = platform::find(machine)?;
        if !core::ptr::eq(desc, &TEGRA_DESC) {
            return None;
        }

        log::info!("Platform: {}", desc.name);
        Some(Self::new(mapper, pic, irqs))
    }

    /// Whether the ictlr bank has been mapped
    pub fn is_initialized(&self) -> bool {
        self.ictlr.is_some()
    }

    /// The mapped ictlr bank, once initialized
    pub fn ictlr(&self) -> Option<&Ictlr<M::Region>> {
        self.ictlr.as_ref()
    }

    /// The primary interrupt controller
    pub fn pic(&self) -> &P {
        &self.pic
    }

    /// Platform configuration
    pub fn config(&self) -> &TegraConfig {
        &self.config
    }

    /// Mediator counters
    #[cfg(feature = "mlic")]
    pub fn mlic(&self) -> &Mlic {
        &self.mlic
    }

    fn lic(&self) -> &Ictlr<M::Region> {
        match &self.ictlr {
            Some(ictlr) => ictlr,
            None => panic!("Tegra LIC: ictlr used before platform initialization"),
        }
    }

    fn is_local(&self, irq: IrqNumber) -> bool {
        irq < self.config.first_ictlr_irq
    }
}

impl<M: IoMapper, P: PrimaryInterruptController> Platform for Tegra<'_, M, P> {
    fn descriptor(&self) -> &'static PlatformDesc {
        &TEGRA_DESC
    }

    /// Map the ictlr bank and put every instance into its boot default
    ///
    /// # Panics
    /// If the bank cannot be mapped.
    fn initialize(&mut self) -> Result<()> {
        if self.ictlr.is_some() {
            log::warn!("Tegra: platform already initialized");
            return Err(Error::InvalidState);
        }

        let layout = IctlrLayout::from_config(&self.config);
        let ictlr = match Ictlr::map(&self.mapper, self.config.ictlr_base, layout) {
            Some(ictlr) => ictlr,
            None => panic!("Failed to map in the Tegra legacy interrupt controller"),
        };

        ictlr.reset();
        log::info!(
            "Tegra: {} ictlrs at {:#x}, IRQs {}-{} gated",
            layout.count,
            self.config.ictlr_base,
            self.config.first_ictlr_irq,
            self.config.ictlr_irq_end() - 1
        );

        self.ictlr = Some(ictlr);
        Ok(())
    }

    fn reset(&self) {
        let config = &self.config;
        let pmc = match RegisterWindow::map(&self.mapper, config.reset_base, config.reset_size) {
            Some(pmc) => pmc,
            None => {
                log::error!("Tegra: Unable to map tegra reset address. Reset failed!");
                return;
            }
        };

        let mut cntrl: LocalRegisterCopy<u32, PMC_CNTRL::Register> =
            LocalRegisterCopy::new(pmc.read_u32(0));
        cntrl.modify(PMC_CNTRL::MAIN_RST::SET);
        pmc.write_u32(0, cntrl.get());
    }

    fn is_routable(&self, rirq: &RawIrq<'_>) -> bool {
        // Wired straight to the GIC
        if rirq.controller.id() == self.pic.node_id() {
            return true;
        }

        match_node(&TEGRA_ICTLR_MATCH, rirq.controller).is_some()
    }

    fn route_to_hypervisor(&self, desc: &mut IrqDesc, priority: u32) {
        self.pic.route_irq_to_hypervisor(desc, priority);

        if self.is_local(desc.irq) {
            return;
        }

        self.lic().set_interrupt_enable(desc.irq, true);
    }

    fn route_to_guest(
        &self,
        domain: &Domain,
        virq: IrqNumber,
        desc: &mut IrqDesc,
        priority: u32,
    ) -> Result<()> {
        if let Err(err) = self.pic.route_irq_to_guest(domain, virq, desc, priority) {
            log::error!(
                "Tegra LIC: Couldn't program GIC to route vIRQ {} ({})",
                desc.irq,
                err.errno()
            );
            return Err(err);
        }

        if self.is_local(desc.irq) {
            return Ok(());
        }

        // The hardware domain unmasks its own lines through the mediator
        self.lic().set_interrupt_enable(desc.irq, !domain.is_hardware_domain());
        Ok(())
    }

    /// Put the ictlr bank behind the mediator
    #[cfg(feature = "mlic")]
    fn hwdom_init<'h>(&'h self, domain: &Domain, bus: &mut MmioBus<'h>) -> Result<()> {
        let ictlr = self.ictlr.as_ref().ok_or(Error::NotInitialized)?;
        mlic::hwdom_init(domain, bus, self, ictlr.phys_base(), ictlr.layout().window_size())
    }
}

#[cfg(feature = "mlic")]
impl<M: IoMapper, P: PrimaryInterruptController> MmioHandler for Tegra<'_, M, P> {
    fn read(&self, domain: &Domain, info: &MmioInfo) -> Result<u32> {
        let ictlr = self.ictlr.as_ref().ok_or(Error::NotInitialized)?;
        self.mlic.read(ictlr, self.irqs, domain, info)
    }

    fn write(&self, domain: &Domain, info: &MmioInfo, value: u32) -> Result<()> {
        let ictlr = self.ictlr.as_ref().ok_or(Error::NotInitialized)?;
        self.mlic.write(ictlr, self.irqs, domain, info, value)
    }
}
