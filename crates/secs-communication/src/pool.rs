use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use secs_protocol::Message;

use crate::error::{PoolError, TransactionError};
use crate::transaction::Transaction;

/// Maps system-bytes to the pending transaction awaiting a reply. At most
/// one transaction per system-bytes may be registered at a time.
pub struct SendReplyPool {
    inner: Mutex<HashMap<[u8; 4], Arc<Transaction>>>,
}

impl Default for SendReplyPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SendReplyPool {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, tx: Arc<Transaction>) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().unwrap();
        let key = tx.message.system_bytes;
        if inner.contains_key(&key) {
            return Err(PoolError::DuplicateSystemBytes(key));
        }
        inner.insert(key, tx);
        Ok(())
    }

    pub fn unregister(&self, system_bytes: [u8; 4]) {
        self.inner.lock().unwrap().remove(&system_bytes);
    }

    pub fn notify_sent(&self, system_bytes: [u8; 4]) {
        if let Some(tx) = self.inner.lock().unwrap().get(&system_bytes) {
            tx.notify_sent();
        }
    }

    /// Returns true if a pending transaction matched `msg.system_bytes`.
    pub fn notify_reply(&self, msg: Message) -> bool {
        let inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.get(&msg.system_bytes) {
            tx.notify_reply(msg);
            true
        } else {
            false
        }
    }

    pub fn notify_exception(&self, system_bytes: [u8; 4], err: TransactionError) {
        if let Some(tx) = self.inner.lock().unwrap().get(&system_bytes) {
            tx.notify_exception(err);
        }
    }

    pub fn notify_timer_reset(&self, system_bytes: [u8; 4]) {
        if let Some(tx) = self.inner.lock().unwrap().get(&system_bytes) {
            tx.notify_timer_reset();
        }
    }

    /// Wakes every pending transaction with a communicator-closed exception.
    /// Called once from `close()`.
    pub fn broadcast_closed(&self) {
        let inner = self.inner.lock().unwrap();
        for tx in inner.values() {
            tx.notify_exception(TransactionError::CommunicatorClosed);
        }
    }
}
