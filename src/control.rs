use crate::endpoint::EndpointNumber;
use crate::fmt::*;
use crate::hardware::UsbHardware;
use crate::state::{Device, LpmState};
use crate::Error;
use embassy_usb_driver::{Direction, EndpointAddress};

impl<H: UsbHardware, const EP0_BUF: usize> Device<H, EP0_BUF> {
    /// Set the device address assigned by the host.
    ///
    /// Unlike some USB cores, this one needs no special handling for address 0: the address
    /// register is simply written.
    pub fn set_address(&mut self, address: u8) -> Result<(), Error> {
        trace!("set_address {:#x}", address);
        self.with_lock(|dev| {
            dev.address = address;
            dev.hw.set_address(address);
        })
    }

    pub fn ep_set_stall(&mut self, addr: EndpointAddress) -> Result<(), Error> {
        self.set_stall(addr, true)
    }

    pub fn ep_clear_stall(&mut self, addr: EndpointAddress) -> Result<(), Error> {
        self.set_stall(addr, false)
    }

    fn set_stall(&mut self, addr: EndpointAddress, stall: bool) -> Result<(), Error> {
        let number = EndpointNumber::from_address(addr)?;
        trace!(
            "endpoint_set_stalled EP{} in={} stall={}",
            number.index(),
            addr.is_in(),
            stall
        );

        self.with_lock(|dev| {
            if number.is_control() {
                // Control transfers use both directions of EP0, so they are stalled together.
                for direction in [Direction::In, Direction::Out] {
                    dev.hw.set_stall(number, direction, stall);
                    dev.endpoints.get_mut(number, direction).stalled = stall;
                }
            } else {
                let direction = addr.direction();
                dev.hw.set_stall(number, direction, stall);
                dev.endpoints.get_mut(number, direction).stalled = stall;
            }
        })
    }

    /// Start signaling remote wakeup to the host.
    ///
    /// Resume signaling is not implemented for this hardware revision in either the L1 or the
    /// L2 state; the request is only recorded.
    pub fn activate_remote_wakeup(&mut self) -> Result<(), Error> {
        match self.lpm_state {
            LpmState::L1 => warn!("remote wakeup from L1 is not supported"),
            _ => warn!("remote wakeup from L2 is not supported"),
        }
        self.remote_wakeup = true;
        Ok(())
    }

    pub fn deactivate_remote_wakeup(&mut self) -> Result<(), Error> {
        match self.lpm_state {
            LpmState::L1 => trace!("deactivate L1 remote wakeup"),
            _ => trace!("deactivate L2 remote wakeup"),
        }
        self.remote_wakeup = false;
        Ok(())
    }

    pub fn remote_wakeup_active(&self) -> bool {
        self.remote_wakeup
    }
}
