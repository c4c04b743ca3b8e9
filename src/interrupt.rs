use crate::callbacks::Callbacks;
use crate::driver::Pcd;
use crate::endpoint::EndpointNumber;
use crate::fmt::*;
use crate::hardware::UsbHardware;
use crate::state::LpmState;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_usb_driver::Direction;

/// The interrupt sources of the USB controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interrupt {
    StartOfFrame,
    Reset,
    VbusToggle,
    DescriptorCmd,
    Ep0SetupCmd,
    Ep0SetupDone,
    Ep0InCmd,
    Ep0InDone,
    Ep0OutCmd,
    Ep0OutDone,
    /// An IN endpoint is ready for more data.
    EpCmd(EndpointNumber),
    /// An OUT endpoint has received data.
    EpDone(EndpointNumber),
    ResetEnd,
    LpmWakeup,
    LpmPacket,
    /// No SOF seen for 3ms.
    LostSof,
    BusError,
}

// The order in which pending interrupts are serviced, one per call to irq_handler().
// A reset must be handled before any EP0 events that may have been latched with it.
const PRIORITY: [Interrupt; 29] = {
    use Interrupt::*;
    let ep = EndpointNumber::ALL;
    [
        StartOfFrame,
        Reset,
        Ep0SetupDone,
        Ep0InDone,
        Ep0OutDone,
        EpCmd(ep[1]),
        EpDone(ep[1]),
        EpCmd(ep[2]),
        EpDone(ep[2]),
        EpCmd(ep[3]),
        EpDone(ep[3]),
        EpCmd(ep[4]),
        EpDone(ep[4]),
        EpCmd(ep[5]),
        EpDone(ep[5]),
        EpCmd(ep[6]),
        EpDone(ep[6]),
        EpCmd(ep[7]),
        EpDone(ep[7]),
        ResetEnd,
        LpmWakeup,
        LpmPacket,
        LostSof,
        BusError,
        VbusToggle,
        DescriptorCmd,
        Ep0SetupCmd,
        Ep0InCmd,
        Ep0OutCmd,
    ]
};

impl Interrupt {
    /// Every interrupt bit the driver knows about.
    pub const ALL: u32 = 0xf8ff_ffff;

    /// The bit for this interrupt in the status, enable, mask and clear registers.
    ///
    /// Endpoints 1-7 each own a pair of bits starting at bit 10, cmd first.  For EP0 the
    /// dedicated EP0 in-cmd and out-done bits are returned.
    pub const fn bit(self) -> u32 {
        use Interrupt::*;
        let shift = match self {
            StartOfFrame => 0,
            Reset => 1,
            VbusToggle => 2,
            DescriptorCmd => 3,
            Ep0SetupCmd => 4,
            Ep0SetupDone => 5,
            Ep0InCmd => 6,
            Ep0InDone => 7,
            Ep0OutCmd => 8,
            Ep0OutDone => 9,
            EpCmd(ep) if ep.is_control() => 6,
            EpDone(ep) if ep.is_control() => 9,
            EpCmd(ep) => 10 + 2 * (ep.index() as u32 - 1),
            EpDone(ep) => 11 + 2 * (ep.index() as u32 - 1),
            ResetEnd => 27,
            LpmWakeup => 28,
            LpmPacket => 29,
            LostSof => 30,
            BusError => 31,
        };
        1 << shift
    }

    /// The highest priority interrupt set in `status`.
    pub fn next_pending(status: u32) -> Option<Self> {
        PRIORITY
            .iter()
            .copied()
            .find(|irq| status & irq.bit() != 0)
    }
}

impl<H: UsbHardware, C: Callbacks<H, EP0_BUF>, const EP0_BUF: usize> Pcd<H, C, EP0_BUF> {
    /// Service one pending interrupt.
    ///
    /// Only the highest priority pending interrupt is cleared and handled.  The controller keeps
    /// the interrupt line raised while other flags are pending, so the handler is entered again
    /// for each of them.
    pub fn irq_handler(&mut self) {
        let Self { device, callbacks } = self;
        let status = device.hw.interrupt_status();
        let Some(irq) = Interrupt::next_pending(status) else {
            return;
        };
        trace!("USB interrupt: status={:#x}", status);
        // Clear before servicing: an upcall may re-arm the endpoint, and the next event on it
        // sets this bit again before we return.
        device.hw.clear_interrupts(irq.bit());

        let ep0 = EndpointNumber::EP0;
        match irq {
            Interrupt::StartOfFrame => {
                trace!("SOF frame={}", device.hw.frame_number());
                callbacks.on_start_of_frame(device);
            }
            Interrupt::Reset => {
                debug!("USB reset");
                device.process_reset();
                callbacks.on_reset(device);
            }
            Interrupt::Ep0SetupDone => {
                if device.read_setup_packet() {
                    callbacks.on_setup_stage(device);
                }
                // Re-arm EP0 even if the packet never arrived, so the next one can.
                device.hw.set_ready(ep0);
            }
            Interrupt::Ep0InDone => {
                let ep = device.endpoints.get_mut(ep0, Direction::In);
                ep.transfer.advance();
                trace!("EP0 IN done, {} bytes left", ep.transfer.remaining_length());
                callbacks.on_data_in_stage(device, ep0);
            }
            Interrupt::Ep0OutDone => {
                device.receive_ep0_out();
                callbacks.on_data_out_stage(device, ep0);
            }
            Interrupt::EpCmd(ep) => {
                trace!("EP{} IN ready", ep.index());
                callbacks.on_data_in_stage(device, ep);
            }
            Interrupt::EpDone(ep) => {
                trace!("EP{} OUT data", ep.index());
                callbacks.data_out_irq(device, ep);
            }
            Interrupt::ResetEnd => {
                trace!("USB reset end");
                device.hw.set_ready(ep0);
            }
            Interrupt::LpmWakeup => {
                debug!("LPM wakeup");
                device.lpm_state = LpmState::L0;
                callbacks.on_resume(device);
            }
            Interrupt::LpmPacket => {
                debug!("LPM packet");
                device.lpm_state = LpmState::L1;
                callbacks.on_suspend(device);
            }
            Interrupt::LostSof => {
                debug!("no SOF for 3ms");
                device.lpm_state = LpmState::L2;
            }
            Interrupt::BusError => {
                warn!("USB bus error: {:#x}", device.hw.bus_errors());
            }
            Interrupt::VbusToggle => {
                device.vbus_present = !device.vbus_present;
                debug!("VBUS present={}", device.vbus_present);
                if device.vbus_present {
                    callbacks.on_connect(device);
                } else {
                    callbacks.on_disconnect(device);
                }
            }
            Interrupt::DescriptorCmd
            | Interrupt::Ep0SetupCmd
            | Interrupt::Ep0InCmd
            | Interrupt::Ep0OutCmd => {
                trace!("ignoring interrupt {:#x}", irq.bit());
            }
        }
    }
}

/// A home for a [`Pcd`] that both the USB interrupt vector and task code can reach.
///
/// Declare one as a `static`, `install()` the driver once it is initialized, and call
/// `on_interrupt()` from the USB interrupt vector.  Task code goes through `with()`, which holds
/// a critical section so the interrupt handler cannot run in the middle of an operation.
pub struct SharedPcd<H, C, const EP0_BUF: usize = 64> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Option<Pcd<H, C, EP0_BUF>>>>,
}

impl<H, C, const EP0_BUF: usize> SharedPcd<H, C, EP0_BUF> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }
}

impl<H, C, const EP0_BUF: usize> Default for SharedPcd<H, C, EP0_BUF> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: UsbHardware, C: Callbacks<H, EP0_BUF>, const EP0_BUF: usize> SharedPcd<H, C, EP0_BUF> {
    pub fn install(&self, pcd: Pcd<H, C, EP0_BUF>) {
        self.inner.lock(|cell| *cell.borrow_mut() = Some(pcd));
    }

    pub fn take(&self) -> Option<Pcd<H, C, EP0_BUF>> {
        self.inner.lock(|cell| cell.borrow_mut().take())
    }

    /// Call this from the USB interrupt vector.
    pub fn on_interrupt(&self) {
        self.inner.lock(|cell| match cell.borrow_mut().as_mut() {
            Some(pcd) => pcd.irq_handler(),
            None => warn!("USB interrupt with no driver installed"),
        });
    }

    /// Run `f` on the installed driver.  Returns None if nothing is installed.
    pub fn with<R>(&self, f: impl FnOnce(&mut Pcd<H, C, EP0_BUF>) -> R) -> Option<R> {
        self.inner.lock(|cell| cell.borrow_mut().as_mut().map(f))
    }
}
