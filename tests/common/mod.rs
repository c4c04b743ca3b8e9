//! A simulated BL702 USB controller and a device stack that records its upcalls.
#![allow(dead_code)]

use bl702_pcd::{
    Callbacks, Config, DataOutSignal, Device, EndpointNumber, Interrupt, Pcd, UsbHardware,
};
use embassy_usb_driver::{Direction, EndpointAddress, EndpointType};
use std::cell::Cell;
use std::collections::VecDeque;

fn dir(direction: Direction) -> usize {
    match direction {
        Direction::In => 0,
        Direction::Out => 1,
    }
}

/// When the EP0 RX count becomes visible to `rx_fifo_count()`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SetupTiming {
    Immediate,
    AfterPolls(u32),
    Never,
}

pub struct MockUsb {
    pub enabled: bool,
    pub pullup: bool,
    pub lpm_enabled: bool,
    pub int_enabled: u32,
    pub int_status: u32,
    pub address: u8,
    pub bus_errors: u32,
    pub frame: u16,
    /// Every configure_endpoint() call, in order.
    pub configured: Vec<(u8, Direction, EndpointType, u16)>,
    pub nack: [[bool; 2]; 8],
    pub stall: [[bool; 2]; 8],
    pub ready: [usize; 8],
    pub rx: [VecDeque<u8>; 8],
    tx_pending: [Vec<u8>; 8],
    /// Contents of the TX FIFO each time an endpoint was set ready.
    pub committed: Vec<(u8, Vec<u8>)>,
    pub setup_timing: SetupTiming,
    pub ep0_count_polls: Cell<u32>,
    pub fifo_reads: usize,
    /// tx_fifo_space() reports a full FIFO for this many more polls.
    pub tx_busy_polls: Cell<u32>,
    pub tx_space_polls: Cell<u32>,
}

impl MockUsb {
    pub fn new() -> Self {
        Self {
            enabled: false,
            pullup: false,
            lpm_enabled: false,
            int_enabled: 0,
            int_status: 0,
            address: 0xff,
            bus_errors: 0,
            frame: 0,
            configured: Vec::new(),
            nack: [[true; 2]; 8],
            stall: [[false; 2]; 8],
            ready: [0; 8],
            rx: std::array::from_fn(|_| VecDeque::new()),
            tx_pending: std::array::from_fn(|_| Vec::new()),
            committed: Vec::new(),
            setup_timing: SetupTiming::Immediate,
            ep0_count_polls: Cell::new(0),
            fifo_reads: 0,
            tx_busy_polls: Cell::new(0),
            tx_space_polls: Cell::new(0),
        }
    }

    pub fn raise(&mut self, irq: Interrupt) {
        self.int_status |= irq.bit();
    }

    pub fn receive(&mut self, ep: u8, data: &[u8]) {
        self.rx[ep as usize].extend(data.iter().copied());
    }

    /// The packets queued on an IN endpoint, one per set_ready().
    pub fn packets(&self, ep: u8) -> Vec<Vec<u8>> {
        self.committed
            .iter()
            .filter(|(n, _)| *n == ep)
            .map(|(_, data)| data.clone())
            .collect()
    }
}

impl UsbHardware for MockUsb {
    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn set_pullup(&mut self, connected: bool) {
        self.pullup = connected;
    }

    fn set_lpm_enabled(&mut self, enabled: bool) {
        self.lpm_enabled = enabled;
    }

    fn enable_interrupts(&mut self, mask: u32) {
        self.int_enabled = mask;
    }

    fn disable_interrupts(&mut self) {
        self.int_enabled = 0;
    }

    fn interrupt_status(&self) -> u32 {
        self.int_status
    }

    fn clear_interrupts(&mut self, mask: u32) {
        self.int_status &= !mask;
    }

    fn bus_errors(&self) -> u32 {
        self.bus_errors
    }

    fn frame_number(&self) -> u16 {
        self.frame
    }

    fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    fn configure_endpoint(
        &mut self,
        ep: EndpointNumber,
        direction: Direction,
        ep_type: EndpointType,
        max_packet_size: u16,
    ) {
        self.configured
            .push((u8::from(ep), direction, ep_type, max_packet_size));
    }

    fn set_nack(&mut self, ep: EndpointNumber, direction: Direction, nack: bool) {
        self.nack[ep.index()][dir(direction)] = nack;
    }

    fn is_nacked(&self, ep: EndpointNumber, direction: Direction) -> bool {
        self.nack[ep.index()][dir(direction)]
    }

    fn set_stall(&mut self, ep: EndpointNumber, direction: Direction, stall: bool) {
        self.stall[ep.index()][dir(direction)] = stall;
    }

    fn is_stalled(&self, ep: EndpointNumber, direction: Direction) -> bool {
        self.stall[ep.index()][dir(direction)]
    }

    fn set_ready(&mut self, ep: EndpointNumber) {
        self.ready[ep.index()] += 1;
        let data = std::mem::take(&mut self.tx_pending[ep.index()]);
        self.committed.push((u8::from(ep), data));
    }

    fn rx_fifo_count(&self, ep: EndpointNumber) -> usize {
        if ep.is_control() {
            let polls = self.ep0_count_polls.get() + 1;
            self.ep0_count_polls.set(polls);
            match self.setup_timing {
                SetupTiming::Immediate => {}
                SetupTiming::AfterPolls(n) if polls >= n => {}
                SetupTiming::AfterPolls(_) | SetupTiming::Never => return 0,
            }
        }
        self.rx[ep.index()].len()
    }

    fn tx_fifo_space(&self, ep: EndpointNumber) -> usize {
        self.tx_space_polls.set(self.tx_space_polls.get() + 1);
        let busy = self.tx_busy_polls.get();
        if busy > 0 {
            self.tx_busy_polls.set(busy - 1);
            return 0;
        }
        64 - self.tx_pending[ep.index()].len()
    }

    fn read_fifo_byte(&mut self, ep: EndpointNumber) -> u8 {
        self.fifo_reads += 1;
        self.rx[ep.index()].pop_front().unwrap_or(0)
    }

    fn write_fifo_byte(&mut self, ep: EndpointNumber, byte: u8) {
        self.tx_pending[ep.index()].push(byte);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    Setup([u8; 8]),
    DataIn(u8),
    DataOut(u8),
    DataOutIrq(u8),
    Reset,
    StartOfFrame,
    Suspend,
    Resume,
    Connect,
    Disconnect,
}

/// A device stack that records every upcall.
///
/// When EP0 IN data is left over after a packet is sent, it queues the next packet the way a
/// real stack does.
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Event>,
    pub ep0_in_data: Vec<u8>,
    pub ep0_transmit_calls: usize,
    pub data_out: DataOutSignal,
    /// Read OUT data inside data_out_irq(), re-arming the endpoint.
    pub receive_in_irq: bool,
    /// Packets the host sends as soon as the endpoint is re-armed.
    pub out_packets: VecDeque<Vec<u8>>,
    pub out_received: Vec<u8>,
}

impl Recorder {
    pub fn data_in_count(&self, ep: u8) -> usize {
        self.events
            .iter()
            .filter(|e| **e == Event::DataIn(ep))
            .count()
    }
}

impl<const N: usize> Callbacks<MockUsb, N> for Recorder {
    fn on_setup_stage(&mut self, dev: &mut Device<MockUsb, N>) {
        self.events.push(Event::Setup(dev.setup_packet()));
    }

    fn on_data_in_stage(&mut self, dev: &mut Device<MockUsb, N>, ep: EndpointNumber) {
        self.events.push(Event::DataIn(ep.into()));
        if !ep.is_control() {
            return;
        }
        let addr = EndpointAddress::from(0x80);
        let remaining = dev.endpoint(addr).unwrap().transfer().remaining_length();
        if remaining > 0 {
            let start = self.ep0_in_data.len() - remaining;
            self.ep0_transmit_calls += 1;
            dev.ep_transmit(addr, &self.ep0_in_data[start..]).unwrap();
        }
    }

    fn on_data_out_stage(&mut self, _dev: &mut Device<MockUsb, N>, ep: EndpointNumber) {
        self.events.push(Event::DataOut(ep.into()));
    }

    fn on_reset(&mut self, _dev: &mut Device<MockUsb, N>) {
        self.events.push(Event::Reset);
    }

    fn data_out_irq(&mut self, dev: &mut Device<MockUsb, N>, ep: EndpointNumber) {
        self.events.push(Event::DataOutIrq(ep.into()));
        self.data_out.notify(ep);
        if !self.receive_in_irq {
            return;
        }

        let out = EndpointAddress::from_parts(ep.index(), Direction::Out);
        let mut buf = [0u8; 64];
        let len = dev.ep_receive(out, &mut buf).unwrap();
        self.out_received.extend_from_slice(&buf[..len]);
        if let Some(next) = self.out_packets.pop_front() {
            let hw = dev.hardware_mut();
            hw.receive(ep.into(), &next);
            hw.raise(Interrupt::EpDone(ep));
        }
    }

    fn on_start_of_frame(&mut self, _dev: &mut Device<MockUsb, N>) {
        self.events.push(Event::StartOfFrame);
    }

    fn on_suspend(&mut self, _dev: &mut Device<MockUsb, N>) {
        self.events.push(Event::Suspend);
    }

    fn on_resume(&mut self, _dev: &mut Device<MockUsb, N>) {
        self.events.push(Event::Resume);
    }

    fn on_connect(&mut self, _dev: &mut Device<MockUsb, N>) {
        self.events.push(Event::Connect);
    }

    fn on_disconnect(&mut self, _dev: &mut Device<MockUsb, N>) {
        self.events.push(Event::Disconnect);
    }
}

pub fn addr(raw: u8) -> EndpointAddress {
    EndpointAddress::from(raw)
}

/// An initialized and started driver on a fresh simulated controller.
pub fn started_pcd(config: Config) -> Pcd<MockUsb, Recorder> {
    let mut pcd = Pcd::new(MockUsb::new(), config, Recorder::default());
    pcd.init().unwrap();
    pcd.start().unwrap();
    pcd
}

/// Raise `irq` and run the interrupt handler once.
pub fn fire<const N: usize>(pcd: &mut Pcd<MockUsb, Recorder, N>, irq: Interrupt) {
    pcd.device_mut().hardware_mut().raise(irq);
    pcd.irq_handler();
}
