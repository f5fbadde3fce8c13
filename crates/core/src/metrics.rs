use crate::TxObserver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct TxMetrics {
    byte_count: AtomicU64,
    poll_count: AtomicU64,
    timeout_count: AtomicU64,
    start_time: Instant,
}

impl Default for TxMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TxMetrics {
    pub fn new() -> Self {
        Self {
            byte_count: AtomicU64::new(0),
            poll_count: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn reset(&self) {
        self.byte_count.store(0, Ordering::SeqCst);
        self.poll_count.store(0, Ordering::SeqCst);
        self.timeout_count.store(0, Ordering::SeqCst);
    }

    pub fn get_bytes(&self) -> u64 {
        self.byte_count.load(Ordering::SeqCst)
    }

    /// Status reads made while waiting for READY.
    pub fn get_polls(&self) -> u64 {
        self.poll_count.load(Ordering::SeqCst)
    }

    pub fn get_timeouts(&self) -> u64 {
        self.timeout_count.load(Ordering::SeqCst)
    }

    pub fn get_bytes_per_sec(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.get_bytes() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl TxObserver for TxMetrics {
    fn on_poll(&self, _status: u32) {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_byte(&self, _byte: u8) {
        self.byte_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_timeout(&self, _polls: u64) {
        self.timeout_count.fetch_add(1, Ordering::SeqCst);
    }
}
