use crate::callbacks::Callbacks;
use crate::endpoint::EndpointTable;
use crate::fmt::*;
use crate::hardware::UsbHardware;
use crate::state::{Device, DeviceState, LpmState, SETUP_BUF_WORDS};
use crate::{Config, Error};

/// The USB peripheral controller driver: a [`Device`] plus the device stack it reports to.
///
/// The board's USB interrupt vector must call [`Pcd::irq_handler()`], usually through a
/// [`crate::SharedPcd`].
pub struct Pcd<H, C, const EP0_BUF: usize = 64> {
    pub(crate) device: Device<H, EP0_BUF>,
    pub(crate) callbacks: C,
}

impl<H: UsbHardware, C: Callbacks<H, EP0_BUF>, const EP0_BUF: usize> Pcd<H, C, EP0_BUF> {
    /// Create the driver.  Nothing is written to the hardware until `init()`.
    pub fn new(hw: H, config: Config, callbacks: C) -> Self {
        Self {
            device: Device::new(hw, config),
            callbacks,
        }
    }

    /// Put the controller and the endpoint table into their initial state.
    ///
    /// The controller is left disabled; call `start()` to attach to the bus.
    pub fn init(&mut self) -> Result<(), Error> {
        let dev = &mut self.device;
        if dev.locked || dev.state == DeviceState::Busy {
            warn!("init while the device is busy");
            return Err(Error::Busy);
        }
        trace!("init");
        dev.state = DeviceState::Busy;

        dev.hw.disable_interrupts();
        dev.hw.set_enabled(false);

        dev.endpoints = EndpointTable::new();
        dev.address = 0;
        dev.lpm_state = LpmState::L0;
        dev.vbus_present = false;
        dev.remote_wakeup = false;
        dev.setup = [0; SETUP_BUF_WORDS];

        dev.state = DeviceState::Ready;
        Ok(())
    }

    /// Stop the controller and return to the state right after `new()`.
    pub fn deinit(&mut self) -> Result<(), Error> {
        trace!("deinit");
        self.stop()?;
        self.device.state = DeviceState::Reset;
        Ok(())
    }

    /// Enable the controller and its interrupts, then connect to the bus.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.device.state != DeviceState::Ready {
            error!("start() called before init()");
            return Err(Error::InvalidState);
        }
        trace!("start");
        self.device.enable();
        self.device.dev_connect()
    }

    pub fn stop(&mut self) -> Result<(), Error> {
        trace!("stop");
        self.device.dev_disconnect()?;
        self.device.disable();
        Ok(())
    }

    pub fn device(&self) -> &Device<H, EP0_BUF> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<H, EP0_BUF> {
        &mut self.device
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    pub fn into_parts(self) -> (Device<H, EP0_BUF>, C) {
        (self.device, self.callbacks)
    }
}
