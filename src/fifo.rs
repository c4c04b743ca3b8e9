//! Byte copies between caller buffers and the per-endpoint FIFO data registers.
//!
//! Every endpoint has its own FIFO register, so there is no packet memory to manage: a copy is
//! just a loop over the data register of the endpoint.

use crate::endpoint::EndpointNumber;
use crate::hardware::UsbHardware;

/// Read up to `len` bytes from the endpoint's RX FIFO into `dest`.
///
/// Does nothing, and touches no hardware, when `dest` is `None`.  At most `dest.len()` bytes are
/// read.  Returns the number of bytes read.
pub fn read<H: UsbHardware>(
    hw: &mut H,
    ep: EndpointNumber,
    dest: Option<&mut [u8]>,
    len: usize,
) -> usize {
    let Some(dest) = dest else {
        return 0;
    };
    let len = len.min(dest.len());
    for byte in &mut dest[..len] {
        *byte = hw.read_fifo_byte(ep);
    }
    len
}

/// Write all of `src` to the endpoint's TX FIFO.
pub fn write<H: UsbHardware>(hw: &mut H, ep: EndpointNumber, src: &[u8]) -> usize {
    for &byte in src {
        hw.write_fifo_byte(ep, byte);
    }
    src.len()
}

/// Pop `len` bytes from the endpoint's RX FIFO and drop them.
pub fn discard<H: UsbHardware>(hw: &mut H, ep: EndpointNumber, len: usize) {
    for _ in 0..len {
        let _ = hw.read_fifo_byte(ep);
    }
}

/// A bounded number of attempts at polling for a hardware condition.
///
/// This replaces open-ended busy loops in interrupt context: the caller polls until the
/// condition holds or the budget runs out, and then carries on either way.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    pub const fn new(attempts: u32) -> Self {
        Self {
            remaining: attempts,
        }
    }

    /// Call `ready` until it returns true or the budget is exhausted.
    ///
    /// Returns whether the condition was met.
    pub fn poll(&mut self, mut ready: impl FnMut() -> bool) -> bool {
        while self.remaining > 0 {
            self.remaining -= 1;
            if ready() {
                return true;
            }
            core::hint::spin_loop();
        }
        false
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
