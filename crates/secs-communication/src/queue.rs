use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use secs_timing::{Duration, Instant};

use crate::transaction::Transaction;

/// What `poll_byte`/`poll_either` handed back.
#[derive(Debug)]
pub enum Polled {
    Byte(u8),
    Tx(Arc<Transaction>),
    Timeout,
    Terminated,
}

struct Inner {
    bytes: VecDeque<u8>,
    txs: VecDeque<Arc<Transaction>>,
    terminated: bool,
}

/// C1: merges inbound raw bytes and outbound send-transaction requests into
/// one pollable stream. Transactions are prioritised over bytes in
/// `poll_either` — the circuit loop uses `poll_byte` instead whenever it's
/// mid-block-read and bytes must take precedence.
pub struct ByteMessageQueue {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Default for ByteMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteMessageQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { bytes: VecDeque::new(), txs: VecDeque::new(), terminated: false }),
            cond: Condvar::new(),
        }
    }

    pub fn put_bytes(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.bytes.extend(bytes.iter().copied());
        self.cond.notify_all();
    }

    pub fn entry_tx(&self, tx: Arc<Transaction>) {
        let mut inner = self.inner.lock().unwrap();
        inner.txs.push_back(tx);
        self.cond.notify_all();
    }

    pub fn poll_byte(&self, timeout: Duration) -> Polled {
        let mut inner = self.inner.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if inner.terminated {
                return Polled::Terminated;
            }
            if let Some(b) = inner.bytes.pop_front() {
                return Polled::Byte(b);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Polled::Timeout;
            }
            let (guard, _) = self.cond.wait_timeout(inner, remaining).unwrap();
            inner = guard;
        }
    }

    pub fn poll_either(&self, timeout: Duration) -> Polled {
        let mut inner = self.inner.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if inner.terminated {
                return Polled::Terminated;
            }
            if let Some(tx) = inner.txs.pop_front() {
                return Polled::Tx(tx);
            }
            if let Some(b) = inner.bytes.pop_front() {
                return Polled::Byte(b);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Polled::Timeout;
            }
            let (guard, _) = self.cond.wait_timeout(inner, remaining).unwrap();
            inner = guard;
        }
    }

    /// Consumes bytes until `silence` elapses without one arriving. Used to
    /// garbage-collect stray bytes after a protocol error.
    pub fn drain_bytes(&self, silence: Duration) {
        loop {
            match self.poll_byte(silence) {
                Polled::Byte(_) => continue,
                Polled::Timeout | Polled::Terminated | Polled::Tx(_) => return,
            }
        }
    }

    /// Unblocks every current and future waiter with `Polled::Terminated`.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.terminated = true;
        self.cond.notify_all();
    }
}
