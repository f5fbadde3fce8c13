use crate::regs::Control;
use crate::{TxError, TxObserver, TxResult, UartRegisters};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How long `send_byte` waits for the transmitter to become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPolicy {
    /// Spin until ready. Never returns if the hardware never asserts ready.
    #[default]
    Spin,
    /// Give up with `HardwareTimeout` after this many status reads.
    Bounded(u64),
}

/// What follows the payload of a string send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Termination {
    /// Carriage return + line feed after every string.
    #[serde(rename = "crlf")]
    CrLf,
    /// Nothing; strings concatenate on the wire.
    #[default]
    #[serde(rename = "none")]
    Raw,
}

/// Numeric base for `send_int`, 2 through 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Radix(u32);

impl Radix {
    pub const BINARY: Radix = Radix(2);
    pub const OCTAL: Radix = Radix(8);
    pub const DECIMAL: Radix = Radix(10);
    pub const HEX: Radix = Radix(16);

    pub fn new(base: u32) -> Option<Self> {
        (2..=16).contains(&base).then_some(Self(base))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Polled transmitter over a UART register pair.
///
/// Each byte goes through the same handshake: spin on `control` until READY, write the
/// byte to `tx_data`, then set ACK with a read-modify-write of `control`. Nothing is
/// buffered, so a returned call means the hardware has been signalled for every byte.
pub struct UartTx<R: UartRegisters> {
    regs: R,
    policy: PollPolicy,
    observers: Vec<Arc<dyn TxObserver>>,
}

impl<R: UartRegisters> UartTx<R> {
    pub fn new(regs: R, policy: PollPolicy) -> Self {
        Self {
            regs,
            policy,
            observers: Vec::new(),
        }
    }

    /// Transmitter with the unbounded spin of the bare-metal programs.
    pub fn spinning(regs: R) -> Self {
        Self::new(regs, PollPolicy::Spin)
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: PollPolicy) {
        self.policy = policy;
    }

    pub fn add_observer(&mut self, observer: Arc<dyn TxObserver>) {
        self.observers.push(observer);
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn into_inner(self) -> R {
        self.regs
    }

    fn wait_ready(&mut self) -> TxResult<()> {
        let mut polls: u64 = 0;
        loop {
            if let PollPolicy::Bounded(limit) = self.policy {
                if polls >= limit {
                    tracing::warn!("UART not ready after {} polls", polls);
                    for observer in &self.observers {
                        observer.on_timeout(polls);
                    }
                    return Err(TxError::HardwareTimeout { polls });
                }
            }

            let status = self.regs.read_status();
            polls += 1;
            for observer in &self.observers {
                observer.on_poll(status);
            }
            if Control::is_ready(status) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
    }

    /// Send one byte. Any value is valid, including NUL and control characters.
    pub fn send_byte(&mut self, byte: u8) -> TxResult<()> {
        self.wait_ready()?;

        self.regs.write_data(byte as u32);
        let control = self.regs.read_status();
        self.regs.write_control(control | Control::ACK.bits());

        tracing::debug!("TX {:#04x}", byte);
        for observer in &self.observers {
            observer.on_byte(byte);
        }
        Ok(())
    }

    /// Send `text` up to its first NUL byte (or its end), with nothing appended.
    pub fn send_raw(&mut self, text: impl AsRef<[u8]>) -> TxResult<()> {
        for &byte in text.as_ref().iter().take_while(|&&b| b != 0) {
            self.send_byte(byte)?;
        }
        Ok(())
    }

    /// Send `text` up to its first NUL byte, followed by CR LF.
    pub fn send_line(&mut self, text: impl AsRef<[u8]>) -> TxResult<()> {
        self.send_raw(text)?;
        self.send_byte(b'\r')?;
        self.send_byte(b'\n')
    }

    pub fn send_string(
        &mut self,
        text: impl AsRef<[u8]>,
        termination: Termination,
    ) -> TxResult<()> {
        match termination {
            Termination::CrLf => self.send_line(text),
            Termination::Raw => self.send_raw(text),
        }
    }

    /// Send `value` in `radix`, lowercase digits, `-` prefix for negatives.
    pub fn send_int(&mut self, value: i32, radix: Radix) -> TxResult<()> {
        // Widest case is i32::MIN in base 2: 32 digits.
        let mut digits = [0u8; 32];
        let mut len = 0;
        let mut magnitude = value.unsigned_abs();
        let base = radix.get();

        loop {
            digits[len] = DIGITS[(magnitude % base) as usize];
            len += 1;
            magnitude /= base;
            if magnitude == 0 {
                break;
            }
        }

        if value < 0 {
            self.send_byte(b'-')?;
        }
        for &digit in digits[..len].iter().rev() {
            self.send_byte(digit)?;
        }
        Ok(())
    }
}

impl<R: UartRegisters> fmt::Write for UartTx<R> {
    // A `&str` carries its length, so NUL is sent like any other byte here.
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.send_byte(byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

impl<R: UartRegisters + fmt::Debug> fmt::Debug for UartTx<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UartTx")
            .field("regs", &self.regs)
            .field("policy", &self.policy)
            .field("observers", &self.observers.len())
            .finish()
    }
}
