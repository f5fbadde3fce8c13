use crate::regs;
use crate::UartRegisters;
use core::ptr::{read_volatile, write_volatile};

/// Handle to the UART register pair at a fixed physical address.
///
/// The address is captured once at construction; callers only get the three register
/// operations of [`UartRegisters`], never the pointer itself.
#[derive(Debug)]
pub struct MmioUart {
    base: usize,
}

impl MmioUart {
    /// # Safety
    /// `base` must be the mapped address of the UART register block, valid for volatile
    /// 32-bit access at `base + 0x0` and `base + 0x8` for the lifetime of the handle, and no
    /// other handle to the same block may exist.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    fn reg(&self, offset: u64) -> *mut u32 {
        (self.base + offset as usize) as *mut u32
    }
}

impl UartRegisters for MmioUart {
    fn read_status(&mut self) -> u32 {
        // SAFETY: the constructor contract guarantees the control register is mapped.
        unsafe { read_volatile(self.reg(regs::CONTROL)) }
    }

    fn write_control(&mut self, value: u32) {
        // SAFETY: see read_status.
        unsafe { write_volatile(self.reg(regs::CONTROL), value) }
    }

    fn write_data(&mut self, value: u32) {
        // SAFETY: the constructor contract guarantees tx_data is mapped at base + 0x8.
        unsafe { write_volatile(self.reg(regs::TX_DATA), value) }
    }
}
