//! Register layout of the polled transmit UART.
//!
//! | Register | Offset | Access     | Semantics                                   |
//! |----------|--------|------------|---------------------------------------------|
//! | control  | 0x0    | read/write | bit2 = ready (hw -> sw), bit3 = ack (sw -> hw) |
//! | tx_data  | 0x8    | write-only | pending byte, low 8 bits used               |

use bitflags::bitflags;

/// Base address the reference board maps the UART at.
pub const DEFAULT_BASE: usize = 0x0180_0000;

pub const CONTROL: u64 = 0x00;
pub const TX_DATA: u64 = 0x08;

/// Smallest address window covering both registers.
pub const WINDOW_SIZE: u64 = TX_DATA + 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u32 {
        /// Transmitter can accept a byte.
        const READY = 1 << 2;
        /// Software acknowledges the byte written to `tx_data`.
        const ACK = 1 << 3;
    }
}

impl Control {
    pub fn is_ready(raw: u32) -> bool {
        Self::from_bits_retain(raw).contains(Self::READY)
    }
}
