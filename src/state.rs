use crate::endpoint::{EndpointNumber, EndpointTable};
use crate::fifo::{self, RetryBudget};
use crate::fmt::*;
use crate::hardware::UsbHardware;
use crate::{Config, Error};
use embassy_usb_driver::Direction;

/// Words reserved for the setup packet staging buffer.
pub const SETUP_BUF_WORDS: usize = 12;

/// SETUP packets are always 8 bytes long.
pub const SETUP_PACKET_LEN: usize = 8;

/// Coarse lifecycle state of the device handle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    Reset,
    Ready,
    Error,
    Busy,
    Timeout,
}

/// Link power state, as last reported by the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LpmState {
    /// Active.
    L0,
    /// LPM sleep.
    L1,
    /// Classic suspend.
    L2,
}

/// The device handle: endpoint table, setup staging buffer, and the hardware it drives.
///
/// `EP0_BUF` is the size of the buffer that data arriving on the control OUT endpoint is staged
/// in until the device stack picks it up.
pub struct Device<H, const EP0_BUF: usize = 64> {
    pub(crate) hw: H,
    pub(crate) config: Config,
    pub(crate) state: DeviceState,
    pub(crate) locked: bool,
    pub(crate) address: u8,
    pub(crate) lpm_state: LpmState,
    pub(crate) vbus_present: bool,
    pub(crate) remote_wakeup: bool,
    pub(crate) endpoints: EndpointTable,
    pub(crate) setup: [u32; SETUP_BUF_WORDS],
    pub(crate) ep0_out_buf: [u8; EP0_BUF],
}

impl<H: UsbHardware, const EP0_BUF: usize> Device<H, EP0_BUF> {
    pub(crate) fn new(hw: H, config: Config) -> Self {
        Self {
            hw,
            config,
            state: DeviceState::Reset,
            locked: false,
            address: 0,
            lpm_state: LpmState::L0,
            vbus_present: false,
            remote_wakeup: false,
            endpoints: EndpointTable::new(),
            setup: [0; SETUP_BUF_WORDS],
            ep0_out_buf: [0; EP0_BUF],
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn lpm_state(&self) -> LpmState {
        self.lpm_state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// The most recently received SETUP packet.
    ///
    /// This is only meaningful inside `on_setup_stage()`: the next SETUP packet overwrites it.
    pub fn setup_packet(&self) -> [u8; SETUP_PACKET_LEN] {
        let mut packet = [0u8; SETUP_PACKET_LEN];
        packet.copy_from_slice(&bytemuck::cast_slice::<u32, u8>(&self.setup)[..SETUP_PACKET_LEN]);
        packet
    }

    /// Data received on the control OUT endpoint since the last `ep_receive()` on it.
    pub fn ep0_out_data(&self) -> &[u8] {
        let offset = self
            .endpoints
            .get(EndpointNumber::EP0, Direction::Out)
            .transfer
            .offset();
        &self.ep0_out_buf[..offset.min(EP0_BUF)]
    }

    /// Run a register sequence that must not interleave with the interrupt handler.
    ///
    /// Fails with `Error::Busy` if another locked operation is already in progress on this
    /// handle.
    pub(crate) fn with_lock<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> Result<R, Error> {
        if self.locked {
            warn!("USB device handle is locked");
            return Err(Error::Busy);
        }
        self.locked = true;
        let result = critical_section::with(|_| f(self));
        self.locked = false;
        Ok(result)
    }

    /// Put the software state back to what it is right after a bus reset.
    pub(crate) fn process_reset(&mut self) {
        self.address = 0;
        self.hw.set_address(0);
        self.lpm_state = LpmState::L0;
        self.remote_wakeup = false;
        for ep in self.endpoints.iter_mut() {
            ep.stalled = false;
            ep.transfer = Default::default();
        }
    }

    /// Copy a SETUP packet from the EP0 FIFO into the staging buffer.
    ///
    /// The FIFO count is not always valid yet when the setup-done interrupt fires, so this polls
    /// it for a bounded number of attempts.  Returns false if the packet never showed up.
    pub(crate) fn read_setup_packet(&mut self) -> bool {
        let ep0 = EndpointNumber::EP0;
        let mut budget = RetryBudget::new(self.config.setup_poll_budget);
        let hw = &self.hw;
        if !budget.poll(|| hw.rx_fifo_count(ep0) >= SETUP_PACKET_LEN) {
            warn!(
                "SETUP packet not in FIFO after {} polls",
                self.config.setup_poll_budget
            );
            return false;
        }

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.setup);
        fifo::read(
            &mut self.hw,
            ep0,
            Some(&mut bytes[..SETUP_PACKET_LEN]),
            SETUP_PACKET_LEN,
        );
        trace!("SETUP received: {:?}", &bytes[..SETUP_PACKET_LEN]);
        true
    }

    /// Copy a packet that arrived on the control OUT endpoint into the staging buffer.
    pub(crate) fn receive_ep0_out(&mut self) {
        let ep0 = EndpointNumber::EP0;
        let count = self.hw.rx_fifo_count(ep0);
        if count == 0 {
            return;
        }

        let ep = self.endpoints.get_mut(ep0, Direction::Out);
        let offset = ep.transfer.offset().min(EP0_BUF);
        let len = count.min(EP0_BUF - offset);
        fifo::read(
            &mut self.hw,
            ep0,
            Some(&mut self.ep0_out_buf[offset..offset + len]),
            len,
        );
        if len < count {
            warn!(
                "EP0 OUT staging buffer full: dropping {} of {} bytes",
                count - len,
                count
            );
            fifo::discard(&mut self.hw, ep0, count - len);
        }
        trace!("EP0 OUT received {} bytes", len);
        ep.transfer.record_packet(len);
        ep.transfer.advance();
    }
}
