//! Endpoint transfer engine for the BL702 full-speed USB device controller.
//!
//! [`Pcd`] owns the hardware and the endpoint table.  Its interrupt handler services one
//! interrupt per call and reports bus events to a USB device stack through [`Callbacks`]; the
//! stack answers by calling the endpoint operations on [`Device`].
#![cfg_attr(not(test), no_std)]

mod fmt;

mod bus;
mod callbacks;
mod control;
mod driver;
pub mod endpoint;
pub mod fifo;
mod hardware;
mod interrupt;
pub mod regs;
mod state;

pub use crate::callbacks::{Callbacks, DataOutSignal};
pub use crate::driver::Pcd;
pub use crate::endpoint::{
    BufferKind, Endpoint, EndpointNumber, EndpointStatus, Transfer, TransferStrategy,
};
pub use crate::hardware::UsbHardware;
pub use crate::interrupt::{Interrupt, SharedPcd};
pub use crate::state::{Device, DeviceState, LpmState};

/// Number of endpoint numbers the controller supports, each with an IN and an OUT half.
pub const NUM_ENDPOINTS: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Config {
    /// How many times the setup-done handler polls the EP0 FIFO count before giving up on the
    /// SETUP packet.
    pub setup_poll_budget: u32,
    /// How many times a transmit on EP1-7 polls for TX FIFO space before giving up with
    /// `Error::Timeout`.
    pub tx_poll_budget: u32,
    /// Enable the start-of-frame interrupt and the `on_start_of_frame()` upcall.
    pub sof_interrupt: bool,
    /// Accept LPM transactions.
    pub lpm: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            setup_poll_budget: 65535,
            tx_poll_budget: 65535,
            sof_interrupt: false,
            lpm: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The endpoint number is outside 0-7.
    InvalidEndpoint,
    /// The operation is not valid in the current state, e.g. a transfer on an endpoint that
    /// was never opened.
    InvalidState,
    /// Another locked operation is in progress.
    Busy,
    /// The TX FIFO never had room for the next packet.
    Timeout,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::InvalidEndpoint => "invalid endpoint number",
            Error::InvalidState => "invalid device state",
            Error::Busy => "device busy",
            Error::Timeout => "timed out",
        };
        f.write_str(msg)
    }
}
