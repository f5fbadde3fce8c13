pub mod metrics;
pub mod mmio;
pub mod regs;
pub mod shared;
pub mod sim;
pub mod snapshot;
pub mod transmitter;

pub use mmio::MmioUart;
pub use shared::SharedUart;
pub use sim::{ReadyModel, SimulatedUart};
pub use transmitter::{PollPolicy, Radix, Termination, UartTx};

mod tests;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("UART never asserted transmit-ready after {polls} polls")]
    HardwareTimeout { polls: u64 },
}

pub type TxResult<T> = Result<T, TxError>;

/// Capability over the two transmit registers of a UART.
///
/// Implemented by the real memory-mapped handle and by the simulated device, so the
/// transmit protocol can be exercised on a host without touching memory.
pub trait UartRegisters {
    /// Read the `control` register (status bits are hardware-driven).
    fn read_status(&mut self) -> u32;
    fn write_control(&mut self, value: u32);
    fn write_data(&mut self, value: u32);
}

impl<R: UartRegisters + ?Sized> UartRegisters for &mut R {
    fn read_status(&mut self) -> u32 {
        (**self).read_status()
    }

    fn write_control(&mut self, value: u32) {
        (**self).write_control(value)
    }

    fn write_data(&mut self, value: u32) {
        (**self).write_data(value)
    }
}

/// Trait for observing transmit events in a modular way.
pub trait TxObserver: std::fmt::Debug + Send + Sync {
    fn on_poll(&self, _status: u32) {}
    fn on_byte(&self, _byte: u8) {}
    fn on_timeout(&self, _polls: u64) {}
}
