use crate::endpoint::EndpointNumber;
use embassy_usb_driver::{Direction, EndpointType};

/// Register-level operations the transfer engine performs on the USB controller.
///
/// [`crate::regs::Bl702Usb`] implements this on top of the memory-mapped BL702 USB block.  The
/// engine never touches registers directly, so tests can drive it with a simulated controller.
///
/// Interrupt bits use the layout of the BL702 `USB_INT_STS` register; see
/// [`crate::Interrupt::bit`].
pub trait UsbHardware {
    /// Enable or disable the USB core and its software control of EP0.
    fn set_enabled(&mut self, enabled: bool);

    /// Connect or disconnect the D+ pull-up.
    fn set_pullup(&mut self, connected: bool);

    fn set_lpm_enabled(&mut self, enabled: bool);

    /// Enable exactly the interrupts in `mask`, masking all others.
    fn enable_interrupts(&mut self, mask: u32);

    fn disable_interrupts(&mut self);

    fn interrupt_status(&self) -> u32;

    fn clear_interrupts(&mut self, mask: u32);

    /// Raw contents of the bus error register.
    fn bus_errors(&self) -> u32;

    fn frame_number(&self) -> u16;

    fn set_address(&mut self, address: u8);

    /// Program the direction, type and packet size of endpoints 1-7.
    ///
    /// Never called for EP0, which the hardware always treats as the control endpoint.
    fn configure_endpoint(
        &mut self,
        ep: EndpointNumber,
        direction: Direction,
        ep_type: EndpointType,
        max_packet_size: u16,
    );

    fn set_nack(&mut self, ep: EndpointNumber, direction: Direction, nack: bool);

    fn is_nacked(&self, ep: EndpointNumber, direction: Direction) -> bool;

    fn set_stall(&mut self, ep: EndpointNumber, direction: Direction, stall: bool);

    fn is_stalled(&self, ep: EndpointNumber, direction: Direction) -> bool;

    /// Mark the endpoint ready: the data in the TX FIFO may be sent, or the next OUT packet
    /// may be ACKed.
    fn set_ready(&mut self, ep: EndpointNumber);

    /// Number of bytes waiting in the endpoint's RX FIFO.
    fn rx_fifo_count(&self, ep: EndpointNumber) -> usize;

    /// Number of free bytes in the endpoint's TX FIFO.
    fn tx_fifo_space(&self, ep: EndpointNumber) -> usize;

    fn read_fifo_byte(&mut self, ep: EndpointNumber) -> u8;

    fn write_fifo_byte(&mut self, ep: EndpointNumber, byte: u8);
}
