use crate::endpoint::EndpointNumber;
use crate::hardware::UsbHardware;
use crate::state::Device;
use core::future::poll_fn;
use core::sync::atomic::{AtomicU8, Ordering};
use core::task::Poll;
use embassy_sync::waitqueue::AtomicWaker;

/// Upcalls from the interrupt handler into the device stack.
///
/// Every method is called from interrupt context with exclusive access to the device, so it may
/// start the next transfer directly, e.g. by calling `ep_transmit()` from `on_data_in_stage()`.
pub trait Callbacks<H: UsbHardware, const EP0_BUF: usize> {
    /// A SETUP packet was received; read it with [`Device::setup_packet()`].
    fn on_setup_stage(&mut self, dev: &mut Device<H, EP0_BUF>);

    /// The previous IN packet on `ep` was sent.
    ///
    /// For EP0 the transfer state has already been advanced past the packet, so
    /// `remaining_length()` tells whether another call to `ep_transmit()` is needed.
    fn on_data_in_stage(&mut self, dev: &mut Device<H, EP0_BUF>, ep: EndpointNumber);

    /// A packet arrived on the control OUT endpoint and was appended to
    /// [`Device::ep0_out_data()`].
    fn on_data_out_stage(&mut self, dev: &mut Device<H, EP0_BUF>, ep: EndpointNumber);

    fn on_reset(&mut self, dev: &mut Device<H, EP0_BUF>);

    /// Data is waiting in the RX FIFO of OUT endpoint `ep` (1-7).
    ///
    /// Nothing has been read yet; the stack picks the data up with `ep_receive()`, either here or
    /// later from task context (see [`DataOutSignal`]).
    fn data_out_irq(&mut self, dev: &mut Device<H, EP0_BUF>, ep: EndpointNumber);

    fn on_start_of_frame(&mut self, _dev: &mut Device<H, EP0_BUF>) {}

    fn on_suspend(&mut self, _dev: &mut Device<H, EP0_BUF>) {}

    fn on_resume(&mut self, _dev: &mut Device<H, EP0_BUF>) {}

    fn on_connect(&mut self, _dev: &mut Device<H, EP0_BUF>) {}

    fn on_disconnect(&mut self, _dev: &mut Device<H, EP0_BUF>) {}

    // The BL702 raises no incomplete-isochronous events, so these are never called by the
    // interrupt handler.  They exist for stacks written against controllers that do.
    fn on_iso_in_incomplete(&mut self, _dev: &mut Device<H, EP0_BUF>, _ep: EndpointNumber) {}

    fn on_iso_out_incomplete(&mut self, _dev: &mut Device<H, EP0_BUF>, _ep: EndpointNumber) {}
}

/// Hands "data ready on OUT endpoint N" notifications from `data_out_irq()` to task context.
///
/// One pending flag is kept per endpoint, so notifications for the same endpoint coalesce until
/// the task takes them.
pub struct DataOutSignal {
    pending: AtomicU8,
    waker: AtomicWaker,
}

impl DataOutSignal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
            waker: AtomicWaker::new(),
        }
    }

    /// Flag `ep` as having data and wake the waiting task.  Safe to call from interrupt context.
    pub fn notify(&self, ep: EndpointNumber) {
        self.pending.fetch_or(1 << ep.index(), Ordering::Release);
        self.waker.wake();
    }

    /// Clear the flag for `ep`, returning whether it was set.
    pub fn take(&self, ep: EndpointNumber) -> bool {
        let bit = 1 << ep.index();
        self.pending.fetch_and(!bit, Ordering::Acquire) & bit != 0
    }

    /// Wait until `ep` has been notified, consuming the notification.
    pub async fn wait(&self, ep: EndpointNumber) {
        poll_fn(|cx| {
            self.waker.register(cx.waker());
            if self.take(ep) {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await
    }
}

impl Default for DataOutSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_are_per_endpoint() {
        let signal = DataOutSignal::new();
        let ep2 = EndpointNumber::ALL[2];
        let ep5 = EndpointNumber::ALL[5];

        assert!(!signal.take(ep2));
        signal.notify(ep2);
        signal.notify(ep2);
        assert!(!signal.take(ep5));
        assert!(signal.take(ep2));
        assert!(!signal.take(ep2));
    }
}
