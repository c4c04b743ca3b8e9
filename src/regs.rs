use crate::endpoint::EndpointNumber;
use crate::hardware::UsbHardware;
use crate::NUM_ENDPOINTS;
use embassy_usb_driver::{Direction, EndpointType};
use static_assertions::const_assert_eq;
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

pub const USB_BASE: usize = 0x4000_d800;
// GLB_USB_XCVR lives in the global register block rather than the USB block.
pub const GLB_USB_XCVR: usize = 0x4000_0228;

// Each endpoint has a 64 byte FIFO in each direction.
pub const FIFO_DEPTH: usize = 64;

register_structs! {
    pub UsbRegisters {
        (0x000 => config: ReadWrite<u32, CONFIG::Register>),
        (0x004 => lpm_config: ReadWrite<u32, LPM_CONFIG::Register>),
        (0x008 => _reserved008),
        (0x014 => frame_no: ReadOnly<u32, FRAME_NO::Register>),
        (0x018 => error: ReadOnly<u32, ERROR::Register>),
        (0x01c => _reserved01c),
        (0x020 => int_en: ReadWrite<u32>),
        (0x024 => int_sts: ReadOnly<u32>),
        (0x028 => int_mask: ReadWrite<u32>),
        (0x02c => int_clear: WriteOnly<u32>),
        (0x030 => _reserved030),
        // EP0 has no config register: it is controlled through the EP0_SW_* bits of CONFIG.
        (0x040 => ep_config: [ReadWrite<u32, EP_CONFIG::Register>; 7]),
        (0x05c => _reserved05c),
        (0x100 => ep_fifo: [EpFifoRegisters; NUM_ENDPOINTS]),
        (0x180 => @END),
    },

    pub EpFifoRegisters {
        (0x00 => _config),
        (0x04 => status: ReadOnly<u32, FIFO_STATUS::Register>),
        (0x08 => tx_data: WriteOnly<u32, FIFO_DATA::Register>),
        (0x0c => rx_data: ReadOnly<u32, FIFO_DATA::Register>),
        (0x10 => @END),
    }
}

const_assert_eq!(core::mem::size_of::<EpFifoRegisters>(), 0x10);
const_assert_eq!(core::mem::offset_of!(UsbRegisters, ep_fifo), 0x100);

register_bitfields![u32,
    CONFIG [
        USB_EN OFFSET(0) NUMBITS(1) [],
        ROM_DCT_EN OFFSET(4) NUMBITS(1) [],
        EP0_SW_CTRL OFFSET(8) NUMBITS(1) [],
        EP0_SW_ADDR OFFSET(9) NUMBITS(7) [],
        EP0_SW_SIZE OFFSET(16) NUMBITS(9) [],
        EP0_SW_STALL OFFSET(25) NUMBITS(1) [],
        EP0_SW_NACK_IN OFFSET(26) NUMBITS(1) [],
        EP0_SW_NACK_OUT OFFSET(27) NUMBITS(1) [],
        EP0_SW_RDY OFFSET(28) NUMBITS(1) []
    ],
    LPM_CONFIG [
        LPM_EN OFFSET(0) NUMBITS(1) [],
        LPM_RESP_UPD OFFSET(1) NUMBITS(1) [],
        LPM_RESP OFFSET(2) NUMBITS(2) [],
        LPM_ATTR OFFSET(20) NUMBITS(11) [],
        LPM_STS OFFSET(31) NUMBITS(1) []
    ],
    FRAME_NO [
        FRAME_NO OFFSET(0) NUMBITS(11) [],
        PID OFFSET(12) NUMBITS(4) [],
        EP_NO OFFSET(16) NUMBITS(4) []
    ],
    ERROR [
        UTMI_RX_ERR OFFSET(0) NUMBITS(1) [],
        XFER_TO_ERR OFFSET(1) NUMBITS(1) [],
        IVLD_EP_ERR OFFSET(2) NUMBITS(1) [],
        PID_SEQ_ERR OFFSET(3) NUMBITS(1) [],
        PID_CKS_ERR OFFSET(4) NUMBITS(1) [],
        CRC5_ERR OFFSET(5) NUMBITS(1) [],
        CRC16_ERR OFFSET(6) NUMBITS(1) []
    ],
    EP_CONFIG [
        EP_SIZE OFFSET(0) NUMBITS(11) [],
        EP_DIR OFFSET(11) NUMBITS(2) [
            Disabled = 0,
            In = 1,
            Out = 2
        ],
        EP_TYPE OFFSET(13) NUMBITS(3) [
            Interrupt = 0,
            Isochronous = 2,
            Bulk = 4,
            Control = 5
        ],
        EP_STALL OFFSET(16) NUMBITS(1) [],
        EP_NACK_IN OFFSET(17) NUMBITS(1) [],
        EP_NACK_OUT OFFSET(18) NUMBITS(1) [],
        EP_RDY OFFSET(19) NUMBITS(1) []
    ],
    FIFO_STATUS [
        TX_FIFO_CNT OFFSET(0) NUMBITS(7) [],
        TX_FIFO_EMPTY OFFSET(14) NUMBITS(1) [],
        TX_FIFO_FULL OFFSET(15) NUMBITS(1) [],
        RX_FIFO_CNT OFFSET(16) NUMBITS(7) [],
        RX_FIFO_EMPTY OFFSET(30) NUMBITS(1) [],
        RX_FIFO_FULL OFFSET(31) NUMBITS(1) []
    ],
    FIFO_DATA [
        DATA OFFSET(0) NUMBITS(8) []
    ],
    USB_XCVR [
        PU_USB OFFSET(8) NUMBITS(1) [],
        USB_ENUM OFFSET(10) NUMBITS(1) []
    ]
];

/// The BL702 USB controller, accessed through its memory-mapped registers.
pub struct Bl702Usb {
    regs: &'static UsbRegisters,
    xcvr: &'static ReadWrite<u32, USB_XCVR::Register>,
}

// Safety: the register blocks are fixed MMIO addresses with no thread affinity.  Exclusive access
// is provided by whoever owns the Bl702Usb, normally a Pcd stored in a SharedPcd.
unsafe impl Send for Bl702Usb {}

impl Bl702Usb {
    /// # Safety
    ///
    /// The caller must ensure only one Bl702Usb exists at a time, and that nothing else
    /// accesses the USB register block or the GLB_USB_XCVR register while it is alive.
    pub unsafe fn new() -> Self {
        Self {
            regs: &*(USB_BASE as *const UsbRegisters),
            xcvr: &*(GLB_USB_XCVR as *const ReadWrite<u32, USB_XCVR::Register>),
        }
    }

    fn ep_config(&self, ep: EndpointNumber) -> &ReadWrite<u32, EP_CONFIG::Register> {
        // EP_CONFIG registers start at EP1.
        &self.regs.ep_config[ep.index() - 1]
    }

    fn fifo(&self, ep: EndpointNumber) -> &EpFifoRegisters {
        &self.regs.ep_fifo[ep.index()]
    }
}

impl UsbHardware for Bl702Usb {
    fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            // Software handles EP0 rather than the ROM descriptor engine.
            self.regs.config.modify(
                CONFIG::ROM_DCT_EN::CLEAR + CONFIG::EP0_SW_CTRL::SET + CONFIG::USB_EN::SET,
            );
        } else {
            self.regs.config.modify(CONFIG::USB_EN::CLEAR);
        }
    }

    fn set_pullup(&mut self, connected: bool) {
        if connected {
            self.xcvr.modify(USB_XCVR::PU_USB::SET + USB_XCVR::USB_ENUM::SET);
        } else {
            self.xcvr
                .modify(USB_XCVR::PU_USB::CLEAR + USB_XCVR::USB_ENUM::CLEAR);
        }
    }

    fn set_lpm_enabled(&mut self, enabled: bool) {
        self.regs
            .lpm_config
            .modify(LPM_CONFIG::LPM_EN.val(enabled as u32));
    }

    fn enable_interrupts(&mut self, mask: u32) {
        self.regs.int_en.set(mask);
        // A set bit in int_mask masks the interrupt.
        self.regs.int_mask.set(!mask);
    }

    fn disable_interrupts(&mut self) {
        self.regs.int_mask.set(u32::MAX);
        self.regs.int_en.set(0);
    }

    fn interrupt_status(&self) -> u32 {
        self.regs.int_sts.get()
    }

    fn clear_interrupts(&mut self, mask: u32) {
        self.regs.int_clear.set(mask);
    }

    fn bus_errors(&self) -> u32 {
        self.regs.error.get()
    }

    fn frame_number(&self) -> u16 {
        self.regs.frame_no.read(FRAME_NO::FRAME_NO) as u16
    }

    fn set_address(&mut self, address: u8) {
        self.regs
            .config
            .modify(CONFIG::EP0_SW_ADDR.val(address as u32));
    }

    fn configure_endpoint(
        &mut self,
        ep: EndpointNumber,
        direction: Direction,
        ep_type: EndpointType,
        max_packet_size: u16,
    ) {
        let dir = match direction {
            Direction::In => EP_CONFIG::EP_DIR::In,
            Direction::Out => EP_CONFIG::EP_DIR::Out,
        };
        let kind = match ep_type {
            EndpointType::Control => EP_CONFIG::EP_TYPE::Control,
            EndpointType::Isochronous => EP_CONFIG::EP_TYPE::Isochronous,
            EndpointType::Bulk => EP_CONFIG::EP_TYPE::Bulk,
            EndpointType::Interrupt => EP_CONFIG::EP_TYPE::Interrupt,
        };
        self.ep_config(ep)
            .modify(dir + kind + EP_CONFIG::EP_SIZE.val(max_packet_size as u32));
    }

    fn set_nack(&mut self, ep: EndpointNumber, direction: Direction, nack: bool) {
        let nack = nack as u32;
        if ep.is_control() {
            match direction {
                Direction::In => self.regs.config.modify(CONFIG::EP0_SW_NACK_IN.val(nack)),
                Direction::Out => self.regs.config.modify(CONFIG::EP0_SW_NACK_OUT.val(nack)),
            }
        } else {
            match direction {
                Direction::In => self.ep_config(ep).modify(EP_CONFIG::EP_NACK_IN.val(nack)),
                Direction::Out => self.ep_config(ep).modify(EP_CONFIG::EP_NACK_OUT.val(nack)),
            }
        }
    }

    fn is_nacked(&self, ep: EndpointNumber, direction: Direction) -> bool {
        if ep.is_control() {
            match direction {
                Direction::In => self.regs.config.is_set(CONFIG::EP0_SW_NACK_IN),
                Direction::Out => self.regs.config.is_set(CONFIG::EP0_SW_NACK_OUT),
            }
        } else {
            match direction {
                Direction::In => self.ep_config(ep).is_set(EP_CONFIG::EP_NACK_IN),
                Direction::Out => self.ep_config(ep).is_set(EP_CONFIG::EP_NACK_OUT),
            }
        }
    }

    fn set_stall(&mut self, ep: EndpointNumber, _direction: Direction, stall: bool) {
        // The hardware has a single stall bit per endpoint number: EP1-7 are unidirectional,
        // and EP0 always stalls both directions.
        let stall = stall as u32;
        if ep.is_control() {
            self.regs.config.modify(CONFIG::EP0_SW_STALL.val(stall));
        } else {
            self.ep_config(ep).modify(EP_CONFIG::EP_STALL.val(stall));
        }
    }

    fn is_stalled(&self, ep: EndpointNumber, _direction: Direction) -> bool {
        if ep.is_control() {
            self.regs.config.is_set(CONFIG::EP0_SW_STALL)
        } else {
            self.ep_config(ep).is_set(EP_CONFIG::EP_STALL)
        }
    }

    fn set_ready(&mut self, ep: EndpointNumber) {
        if ep.is_control() {
            self.regs.config.modify(CONFIG::EP0_SW_RDY::SET);
        } else {
            self.ep_config(ep).modify(EP_CONFIG::EP_RDY::SET);
        }
    }

    fn rx_fifo_count(&self, ep: EndpointNumber) -> usize {
        self.fifo(ep).status.read(FIFO_STATUS::RX_FIFO_CNT) as usize
    }

    fn tx_fifo_space(&self, ep: EndpointNumber) -> usize {
        // TX_FIFO_CNT counts the free bytes in the TX FIFO.
        self.fifo(ep).status.read(FIFO_STATUS::TX_FIFO_CNT) as usize
    }

    fn read_fifo_byte(&mut self, ep: EndpointNumber) -> u8 {
        self.fifo(ep).rx_data.read(FIFO_DATA::DATA) as u8
    }

    fn write_fifo_byte(&mut self, ep: EndpointNumber, byte: u8) {
        self.fifo(ep).tx_data.write(FIFO_DATA::DATA.val(byte as u32));
    }
}
