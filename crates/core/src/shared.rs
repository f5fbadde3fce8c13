use crate::transmitter::{Radix, Termination, UartTx};
use crate::{TxResult, UartRegisters};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Transmitter handle that can be cloned across threads.
///
/// Every send holds the lock for the whole operation, so a string from one thread is never
/// interleaved with bytes from another.
pub struct SharedUart<R: UartRegisters> {
    inner: Arc<Mutex<UartTx<R>>>,
}

impl<R: UartRegisters> Clone for SharedUart<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: UartRegisters> SharedUart<R> {
    pub fn new(tx: UartTx<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tx)),
        }
    }

    // A panic mid-send leaves the registers between handshakes, which is a valid state.
    fn lock(&self) -> MutexGuard<'_, UartTx<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn send_byte(&self, byte: u8) -> TxResult<()> {
        self.lock().send_byte(byte)
    }

    pub fn send_raw(&self, text: impl AsRef<[u8]>) -> TxResult<()> {
        self.lock().send_raw(text)
    }

    pub fn send_line(&self, text: impl AsRef<[u8]>) -> TxResult<()> {
        self.lock().send_line(text)
    }

    pub fn send_string(&self, text: impl AsRef<[u8]>, termination: Termination) -> TxResult<()> {
        self.lock().send_string(text, termination)
    }

    pub fn send_int(&self, value: i32, radix: Radix) -> TxResult<()> {
        self.lock().send_int(value, radix)
    }

    /// Run `f` with exclusive access to the transmitter.
    pub fn with<T>(&self, f: impl FnOnce(&mut UartTx<R>) -> T) -> T {
        f(&mut self.lock())
    }
}
