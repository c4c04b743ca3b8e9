use crate::fmt::*;
use crate::hardware::UsbHardware;
use crate::interrupt::Interrupt;
use crate::state::Device;
use crate::{Config, Error};

impl<H: UsbHardware, const EP0_BUF: usize> Device<H, EP0_BUF> {
    /// Attach to the bus by enabling the D+ pull-up.
    pub fn dev_connect(&mut self) -> Result<(), Error> {
        trace!("dev_connect");
        self.with_lock(|dev| dev.hw.set_pullup(true))
    }

    pub fn dev_disconnect(&mut self) -> Result<(), Error> {
        trace!("dev_disconnect");
        self.with_lock(|dev| dev.hw.set_pullup(false))
    }

    pub(crate) fn enable(&mut self) {
        trace!("enable");
        self.hw.set_enabled(true);
        self.hw.set_lpm_enabled(self.config.lpm);

        // Drop anything that was latched before we were ready for it.
        self.hw.clear_interrupts(Interrupt::ALL);
        self.hw.enable_interrupts(interrupt_mask(&self.config));
    }

    pub(crate) fn disable(&mut self) {
        trace!("disable");
        self.hw.disable_interrupts();
        self.hw.set_enabled(false);
    }
}

/// The interrupts to enable for a given configuration.
pub(crate) fn interrupt_mask(config: &Config) -> u32 {
    let mut mask = Interrupt::ALL;
    if !config.sof_interrupt {
        mask &= !Interrupt::StartOfFrame.bit();
    }
    if !config.lpm {
        mask &= !(Interrupt::LpmPacket.bit() | Interrupt::LpmWakeup.bit());
    }
    mask
}
