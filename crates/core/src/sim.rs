use crate::regs::{self, Control};
use crate::snapshot::DeviceSnapshot;
use crate::UartRegisters;
use serde::{Deserialize, Serialize};

/// When the simulated transmitter reports READY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyModel {
    #[default]
    Always,
    /// Stuck hardware: READY is never asserted.
    Never,
    /// READY asserts once this many status reads have gone by since the last
    /// acknowledged byte.
    AfterPolls(u64),
}

/// One access to the register pair, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterAccess {
    ReadControl(u32),
    WriteControl(u32),
    WriteData(u32),
}

/// Host-side model of the polled UART.
///
/// A byte written to `tx_data` stays pending until software sets ACK in `control`; the
/// ACK latches it onto the wire and the device clears the bit again.
#[derive(Debug, Default)]
pub struct SimulatedUart {
    control: u32,
    tx_data: u32,
    pending: bool,
    ready: ReadyModel,
    reads_since_ack: u64,
    polls: u64,
    acks: u64,
    overruns: u64,
    protocol_violations: u64,
    wire: Vec<u8>,
    log: Option<Vec<RegisterAccess>>,
}

impl SimulatedUart {
    pub fn new(ready: ReadyModel) -> Self {
        let mut uart = Self {
            ready,
            ..Default::default()
        };
        uart.update_ready();
        uart
    }

    /// Like [`SimulatedUart::new`], but also records every register access.
    /// The log grows by one entry per poll, so keep it off for long spins.
    pub fn with_access_log(ready: ReadyModel) -> Self {
        let mut uart = Self::new(ready);
        uart.log = Some(Vec::new());
        uart
    }

    pub fn ready_model(&self) -> ReadyModel {
        self.ready
    }

    pub fn set_ready_model(&mut self, ready: ReadyModel) {
        self.ready = ready;
        self.reads_since_ack = 0;
        self.update_ready();
    }

    fn update_ready(&mut self) {
        let ready = match self.ready {
            ReadyModel::Always => true,
            ReadyModel::Never => false,
            ReadyModel::AfterPolls(n) => self.reads_since_ack >= n,
        };
        if ready {
            self.control |= Control::READY.bits();
        } else {
            self.control &= !Control::READY.bits();
        }
    }

    /// Raw register read by offset. Unknown offsets and the write-only `tx_data` read as 0.
    pub fn read_reg(&mut self, offset: u64) -> u32 {
        match offset {
            regs::CONTROL => {
                self.update_ready();
                self.reads_since_ack += 1;
                self.polls += 1;
                self.control
            }
            _ => 0,
        }
    }

    /// Raw register write by offset. Unknown offsets are ignored.
    pub fn write_reg(&mut self, offset: u64, value: u32) {
        match offset {
            regs::CONTROL => {
                // READY belongs to the hardware, software cannot change it.
                let ready = self.control & Control::READY.bits();
                self.control = (value & !Control::READY.bits()) | ready;

                if value & Control::ACK.bits() != 0 {
                    self.acknowledge();
                }
            }
            regs::TX_DATA => {
                if self.control & Control::READY.bits() == 0 {
                    tracing::warn!("tx_data written while transmitter not ready");
                    self.protocol_violations += 1;
                }
                if self.pending {
                    tracing::warn!("tx_data overwritten before acknowledge");
                    self.overruns += 1;
                }
                self.tx_data = value;
                self.pending = true;
            }
            _ => {}
        }
    }

    fn acknowledge(&mut self) {
        self.control &= !Control::ACK.bits();
        if !self.pending {
            tracing::warn!("ACK without a pending byte");
            self.protocol_violations += 1;
            return;
        }

        let byte = (self.tx_data & 0xFF) as u8;
        self.wire.push(byte);
        self.pending = false;
        self.acks += 1;
        self.reads_since_ack = 0;
        if let ReadyModel::AfterPolls(_) = self.ready {
            self.update_ready();
        }
    }

    /// Bytes latched onto the wire so far.
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn take_wire(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.wire)
    }

    /// Recorded accesses; empty unless built with [`SimulatedUart::with_access_log`].
    pub fn log(&self) -> &[RegisterAccess] {
        self.log.as_deref().unwrap_or(&[])
    }

    pub fn clear_log(&mut self) {
        if let Some(log) = &mut self.log {
            log.clear();
        }
    }

    fn record(&mut self, access: RegisterAccess) {
        if let Some(log) = &mut self.log {
            log.push(access);
        }
    }

    pub fn control(&self) -> u32 {
        self.control
    }

    /// Total reads of `control`, handshake reads included.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn acks(&self) -> u64 {
        self.acks
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            control: self.control,
            ready_model: self.ready,
            wire: self.wire.clone(),
            wire_text: String::from_utf8_lossy(&self.wire).into_owned(),
            polls: self.polls,
            acks: self.acks,
            overruns: self.overruns,
            protocol_violations: self.protocol_violations,
            pending: self.pending,
        }
    }
}

impl UartRegisters for SimulatedUart {
    fn read_status(&mut self) -> u32 {
        let value = self.read_reg(regs::CONTROL);
        self.record(RegisterAccess::ReadControl(value));
        value
    }

    fn write_control(&mut self, value: u32) {
        self.record(RegisterAccess::WriteControl(value));
        self.write_reg(regs::CONTROL, value);
    }

    fn write_data(&mut self, value: u32) {
        self.record(RegisterAccess::WriteData(value));
        self.write_reg(regs::TX_DATA, value);
    }
}
