use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("transport write failed: {0}")]
    SendError(String),
    #[error("exhausted ENQ/EOT/ACK/NAK retries")]
    RetryOver,
    #[error("communicator closed")]
    CommunicatorClosed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("a transaction with system-bytes {0:02x?} is already pending")]
    DuplicateSystemBytes([u8; 4]),
}
