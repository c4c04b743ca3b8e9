use crate::fifo::{self, RetryBudget};
use crate::fmt::*;
use crate::hardware::UsbHardware;
use crate::regs::FIFO_DEPTH;
use crate::state::Device;
use crate::{Error, NUM_ENDPOINTS};
use embassy_usb_driver::{Direction, EndpointAddress, EndpointType};

/// An endpoint number known to be in the range supported by the hardware (0-7).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointNumber(u8);

impl EndpointNumber {
    pub const EP0: Self = Self(0);

    /// Every endpoint number, indexed by itself.
    pub const ALL: [Self; NUM_ENDPOINTS] = [
        Self(0),
        Self(1),
        Self(2),
        Self(3),
        Self(4),
        Self(5),
        Self(6),
        Self(7),
    ];

    pub const fn new(number: u8) -> Option<Self> {
        if (number as usize) < NUM_ENDPOINTS {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Extract the endpoint number from an address, ignoring the direction bit.
    pub fn from_address(addr: EndpointAddress) -> Result<Self, Error> {
        u8::try_from(addr.index())
            .ok()
            .and_then(Self::new)
            .ok_or(Error::InvalidEndpoint)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_control(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u8> for EndpointNumber {
    type Error = Error;

    fn try_from(number: u8) -> Result<Self, Error> {
        Self::new(number).ok_or(Error::InvalidEndpoint)
    }
}

impl From<EndpointNumber> for u8 {
    fn from(ep: EndpointNumber) -> u8 {
        ep.0
    }
}

/// How `ep_transmit()` moves data larger than one packet.
///
/// The two strategies differ: the control endpoint relies on the device
/// stack to come back from `on_data_in_stage()` for each further packet, while the other
/// endpoints push the whole buffer out before returning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferStrategy {
    /// Write at most one packet per call and return.
    SinglePacketPerCall,
    /// Busy-wait inside the call, writing packets until the whole buffer has been queued.
    DrainSynchronously,
}

impl TransferStrategy {
    pub fn for_endpoint(ep: EndpointNumber) -> Self {
        if ep.is_control() {
            Self::SinglePacketPerCall
        } else {
            Self::DrainSynchronously
        }
    }
}

/// Progress of the transfer most recently started on an endpoint.
///
/// Starting a new transfer replaces this state, discarding anything still in flight.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer {
    total_length: usize,
    remaining_length: usize,
    completed_count: usize,
    offset: usize,
}

impl Transfer {
    pub(crate) fn start(total_length: usize) -> Self {
        Self {
            total_length,
            remaining_length: total_length,
            completed_count: 0,
            offset: 0,
        }
    }

    /// Record that one packet of `len` bytes was moved to or from the FIFO.
    pub(crate) fn record_packet(&mut self, len: usize) {
        self.completed_count = len;
        self.remaining_length = self.remaining_length.saturating_sub(len);
    }

    /// Move the cursor past the most recently completed packet.
    pub(crate) fn advance(&mut self) {
        self.offset += self.completed_count;
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn remaining_length(&self) -> usize {
        self.remaining_length
    }

    /// Size of the most recently completed packet.
    pub fn completed_count(&self) -> usize {
        self.completed_count
    }

    /// Cursor into the transfer buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_active(&self) -> bool {
        self.remaining_length > 0
    }
}

/// The state the engine keeps for one direction of one endpoint.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub(crate) number: EndpointNumber,
    pub(crate) direction: Direction,
    pub(crate) ep_type: EndpointType,
    pub(crate) max_packet_size: u16,
    pub(crate) stalled: bool,
    pub(crate) double_buffered: bool,
    pub(crate) transfer: Transfer,
}

impl Endpoint {
    fn new(number: EndpointNumber, direction: Direction) -> Self {
        Self {
            number,
            direction,
            ep_type: EndpointType::Control,
            max_packet_size: 0,
            stalled: false,
            double_buffered: false,
            transfer: Transfer::default(),
        }
    }

    pub fn number(&self) -> EndpointNumber {
        self.number
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn address(&self) -> EndpointAddress {
        EndpointAddress::from_parts(self.number.index(), self.direction)
    }

    pub fn ep_type(&self) -> EndpointType {
        self.ep_type
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Always false: the hardware has no double-buffer mode.
    pub fn is_double_buffered(&self) -> bool {
        self.double_buffered
    }

    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    /// The packet size to use for transfers, or an error if the endpoint was never opened.
    fn packet_size(&self) -> Result<usize, Error> {
        if self.max_packet_size == 0 {
            error!("EP{} used before being opened", self.number.index());
            return Err(Error::InvalidState);
        }
        Ok(self.max_packet_size as usize)
    }
}

/// The 8 IN and 8 OUT endpoint descriptors.
#[derive(Clone, Debug)]
pub(crate) struct EndpointTable {
    ep_in: [Endpoint; NUM_ENDPOINTS],
    ep_out: [Endpoint; NUM_ENDPOINTS],
}

impl EndpointTable {
    pub(crate) fn new() -> Self {
        Self {
            ep_in: EndpointNumber::ALL.map(|n| Endpoint::new(n, Direction::In)),
            ep_out: EndpointNumber::ALL.map(|n| Endpoint::new(n, Direction::Out)),
        }
    }

    pub(crate) fn get(&self, ep: EndpointNumber, direction: Direction) -> &Endpoint {
        match direction {
            Direction::In => &self.ep_in[ep.index()],
            Direction::Out => &self.ep_out[ep.index()],
        }
    }

    pub(crate) fn get_mut(&mut self, ep: EndpointNumber, direction: Direction) -> &mut Endpoint {
        match direction {
            Direction::In => &mut self.ep_in[ep.index()],
            Direction::Out => &mut self.ep_out[ep.index()],
        }
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Endpoint> {
        self.ep_in.iter_mut().chain(self.ep_out.iter_mut())
    }
}

/// Hardware handshake state of an endpoint, as reported by `ep_status()`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointStatus {
    Ready,
    Nak,
    Stalled,
}

/// Buffering mode requested through `pma_config()`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferKind {
    Single,
    Double,
}

impl<H: UsbHardware, const EP0_BUF: usize> Device<H, EP0_BUF> {
    /// Look up the descriptor for an endpoint address.
    pub fn endpoint(&self, addr: EndpointAddress) -> Result<&Endpoint, Error> {
        let number = EndpointNumber::from_address(addr)?;
        Ok(self.endpoints.get(number, addr.direction()))
    }

    pub fn ep_open(
        &mut self,
        addr: EndpointAddress,
        max_packet_size: u16,
        ep_type: EndpointType,
    ) -> Result<(), Error> {
        let number = EndpointNumber::from_address(addr)?;
        let direction = addr.direction();
        trace!(
            "ep_open EP{} in={} mps={}",
            number.index(),
            addr.is_in(),
            max_packet_size
        );
        if max_packet_size as usize > FIFO_DEPTH {
            warn!(
                "EP{} max packet size {} is larger than the {} byte FIFO",
                number.index(),
                max_packet_size,
                FIFO_DEPTH
            );
        }

        self.with_lock(|dev| {
            let ep = dev.endpoints.get_mut(number, direction);
            ep.number = number;
            ep.direction = direction;
            ep.max_packet_size = max_packet_size;
            ep.ep_type = ep_type;
            ep.transfer = Transfer::default();

            // EP0 is always the control endpoint, and has no type configuration.
            if !number.is_control() {
                dev.hw
                    .configure_endpoint(number, direction, ep_type, max_packet_size);
            }
            dev.hw.set_nack(number, direction, false);
        })
    }

    /// NAK all further traffic on the endpoint.
    ///
    /// The descriptor is left as-is until the next `ep_open()` overwrites it.
    pub fn ep_close(&mut self, addr: EndpointAddress) -> Result<(), Error> {
        let number = EndpointNumber::from_address(addr)?;
        let direction = addr.direction();
        trace!("ep_close EP{} in={}", number.index(), addr.is_in());
        self.with_lock(|dev| dev.hw.set_nack(number, direction, true))
    }

    pub fn ep_status(&self, addr: EndpointAddress) -> Result<EndpointStatus, Error> {
        let number = EndpointNumber::from_address(addr)?;
        let direction = addr.direction();
        let status = if self.hw.is_stalled(number, direction) {
            EndpointStatus::Stalled
        } else if self.hw.is_nacked(number, direction) {
            EndpointStatus::Nak
        } else {
            EndpointStatus::Ready
        };
        Ok(status)
    }

    /// Start sending `data` on an IN endpoint.
    ///
    /// EP0 sends at most one packet per call; see [`TransferStrategy`].  Other endpoints do not
    /// return until every packet has been written to the FIFO, or until the FIFO has stayed full
    /// for `Config::tx_poll_budget` polls, which fails with `Error::Timeout`.
    pub fn ep_transmit(&mut self, addr: EndpointAddress, data: &[u8]) -> Result<(), Error> {
        let number = EndpointNumber::from_address(addr)?;
        let packet_size = self.endpoints.get(number, Direction::In).packet_size()?;
        trace!("IN EP{} transmit {} bytes", number.index(), data.len());

        match TransferStrategy::for_endpoint(number) {
            TransferStrategy::SinglePacketPerCall => {
                self.transmit_single_packet(number, data, packet_size);
                Ok(())
            }
            TransferStrategy::DrainSynchronously => {
                self.transmit_drain(number, data, packet_size)
            }
        }
    }

    fn transmit_single_packet(&mut self, number: EndpointNumber, data: &[u8], packet_size: usize) {
        let len = data.len().min(packet_size);
        let ep = self.endpoints.get_mut(number, Direction::In);
        ep.transfer = Transfer::start(data.len());

        fifo::write(&mut self.hw, number, &data[..len]);
        self.hw.set_ready(number);
        ep.transfer.record_packet(len);
    }

    fn transmit_drain(
        &mut self,
        number: EndpointNumber,
        data: &[u8],
        packet_size: usize,
    ) -> Result<(), Error> {
        let ep = self.endpoints.get_mut(number, Direction::In);
        ep.transfer = Transfer::start(data.len());

        if data.is_empty() {
            self.hw.set_ready(number);
            return Ok(());
        }

        for chunk in data.chunks(packet_size) {
            // A packet larger than the FIFO is written a FIFO's worth at a time.
            for piece in chunk.chunks(FIFO_DEPTH) {
                let mut budget = RetryBudget::new(self.config.tx_poll_budget);
                let hw = &self.hw;
                if !budget.poll(|| hw.tx_fifo_space(number) >= piece.len()) {
                    error!(
                        "EP{} TX FIFO full: gave up with {} bytes unsent",
                        number.index(),
                        ep.transfer.remaining_length()
                    );
                    return Err(Error::Timeout);
                }
                fifo::write(&mut self.hw, number, piece);
            }
            self.hw.set_ready(number);
            ep.transfer.record_packet(chunk.len());
            ep.transfer.advance();
        }
        Ok(())
    }

    /// Start a receive of `buf.len()` bytes on an OUT endpoint.
    ///
    /// The first packet's worth of data is read from the FIFO immediately, and the number of
    /// bytes read is returned.  Arrival of further data is reported by the interrupt handler.
    pub fn ep_receive(&mut self, addr: EndpointAddress, buf: &mut [u8]) -> Result<usize, Error> {
        let number = EndpointNumber::from_address(addr)?;
        let packet_size = self.endpoints.get(number, Direction::Out).packet_size()?;
        trace!("OUT EP{} receive len={}", number.index(), buf.len());

        let len = buf.len().min(packet_size);
        let ep = self.endpoints.get_mut(number, Direction::Out);
        ep.transfer = Transfer::start(buf.len());

        let read = fifo::read(&mut self.hw, number, Some(&mut buf[..len]), len);
        ep.transfer.record_packet(read);
        self.hw.set_ready(number);
        Ok(read)
    }

    /// Size of the last packet received on an OUT endpoint.
    pub fn ep_get_rx_count(&self, addr: EndpointAddress) -> Result<usize, Error> {
        let number = EndpointNumber::from_address(addr)?;
        Ok(self
            .endpoints
            .get(number, Direction::Out)
            .transfer
            .completed_count())
    }

    /// The FIFOs on this hardware cannot be flushed independently, so this does nothing.
    pub fn ep_flush(&mut self, addr: EndpointAddress) -> Result<(), Error> {
        let number = EndpointNumber::from_address(addr)?;
        trace!("ep_flush EP{}: nothing to do", number.index());
        Ok(())
    }

    /// Record the buffering mode for an endpoint.
    ///
    /// Only single buffering exists on this hardware; a double buffering request is logged and
    /// recorded as single.
    pub fn pma_config(&mut self, addr: EndpointAddress, kind: BufferKind) -> Result<(), Error> {
        let number = EndpointNumber::from_address(addr)?;
        if kind == BufferKind::Double {
            warn!(
                "EP{}: double buffering is not supported, using a single buffer",
                number.index()
            );
        }
        self.endpoints
            .get_mut(number, addr.direction())
            .double_buffered = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_number_range() {
        assert_eq!(EndpointNumber::new(7).map(|ep| ep.index()), Some(7));
        assert_eq!(EndpointNumber::new(8), None);
        assert_eq!(EndpointNumber::try_from(9u8), Err(Error::InvalidEndpoint));
    }

    #[test]
    fn endpoint_number_from_address_ignores_direction() {
        let ep = EndpointNumber::from_address(EndpointAddress::from(0x83)).unwrap();
        assert_eq!(u8::from(ep), 3);
        assert_eq!(
            EndpointNumber::from_address(EndpointAddress::from(0x88)),
            Err(Error::InvalidEndpoint)
        );
    }

    #[test]
    fn strategy_depends_on_endpoint_number() {
        assert_eq!(
            TransferStrategy::for_endpoint(EndpointNumber::EP0),
            TransferStrategy::SinglePacketPerCall
        );
        for ep in &EndpointNumber::ALL[1..] {
            assert_eq!(
                TransferStrategy::for_endpoint(*ep),
                TransferStrategy::DrainSynchronously
            );
        }
    }

    #[test]
    fn transfer_progress() {
        let mut xfer = Transfer::start(200);
        assert!(xfer.is_active());
        xfer.record_packet(64);
        assert_eq!(xfer.remaining_length(), 136);
        assert_eq!(xfer.offset(), 0);
        xfer.advance();
        assert_eq!(xfer.offset(), 64);

        xfer.record_packet(136);
        xfer.advance();
        assert!(!xfer.is_active());
        assert_eq!(xfer.offset(), 200);
        assert_eq!(xfer.completed_count(), 136);
    }

    #[test]
    fn table_starts_with_numbered_descriptors() {
        let table = EndpointTable::new();
        for ep in EndpointNumber::ALL {
            let ep_in = table.get(ep, Direction::In);
            assert_eq!(ep_in.number(), ep);
            assert_eq!(ep_in.direction(), Direction::In);
            assert_eq!(ep_in.address(), EndpointAddress::from(0x80 | u8::from(ep)));
            let ep_out = table.get(ep, Direction::Out);
            assert_eq!(ep_out.direction(), Direction::Out);
            assert_eq!(ep_out.max_packet_size(), 0);
        }
    }
}
