use thiserror::Error;

/// Misuse of the façade API itself — caught before anything touches the
/// wire. Mirrors `_try_gt_zero`/the device-id range check the Python base
/// class performs on every property setter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("device-id {0} exceeds the 15-bit range 0..=32767")]
    InvalidDeviceId(u16),
    #[error("timeout_{0} must be greater than zero")]
    InvalidTimeout(&'static str),
    #[error("communicator is already open")]
    AlreadyOpen,
    #[error("communicator is already closed")]
    AlreadyClosed,
    #[error("a transaction with system-bytes {0:02x?} is already pending")]
    SystemBytesCollision([u8; 4]),
    #[error("reply() must not set w_bit; a reply never itself expects a reply")]
    ReplyMustNotSetWBit,
    #[error("no SmlParser configured; construct the communicator with one to use send_sml/reply_sml")]
    NoSmlParser,
    #[error("cannot reopen a communicator after it has been closed")]
    ReopenAfterClose,
}

/// §7's error taxonomy, unified across the SECS-I and HSMS-SS backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommunicatorError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error("transport write failed: {0}")]
    SendError(String),
    #[error("exhausted ENQ/EOT/ACK/NAK retries")]
    RetryOver,
    #[error("send with W-bit received no reply (T3 timeout)")]
    T3Timeout,
    #[error("select/linktest reply timed out (T6 timeout)")]
    T6Timeout,
    #[error("peer rejected the request")]
    Rejected,
    #[error("communicator is closed")]
    Closed,
    #[error("failed to reassemble message: {0}")]
    ParseError(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<secs_transport::TransportError> for CommunicatorError {
    fn from(err: secs_transport::TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<secs_communication::TransactionError> for CommunicatorError {
    fn from(err: secs_communication::TransactionError) -> Self {
        match err {
            secs_communication::TransactionError::SendError(e) => Self::SendError(e),
            secs_communication::TransactionError::RetryOver => Self::RetryOver,
            secs_communication::TransactionError::CommunicatorClosed => Self::Closed,
        }
    }
}

impl From<secs_communication::PoolError> for CommunicatorError {
    fn from(err: secs_communication::PoolError) -> Self {
        match err {
            secs_communication::PoolError::DuplicateSystemBytes(key) => {
                Self::Usage(UsageError::SystemBytesCollision(key))
            }
        }
    }
}

impl From<secs_circuit::EngineError> for CommunicatorError {
    fn from(err: secs_circuit::EngineError) -> Self {
        match err {
            secs_circuit::EngineError::TransportClosed => Self::Closed,
            secs_circuit::EngineError::ParseError(e) => Self::ParseError(e.to_string()),
        }
    }
}

impl From<secs_hsms::HsmsError> for CommunicatorError {
    fn from(err: secs_hsms::HsmsError) -> Self {
        match err {
            secs_hsms::HsmsError::TimeoutT8 | secs_hsms::HsmsError::Closed | secs_hsms::HsmsError::Framing => {
                Self::Closed
            }
            secs_hsms::HsmsError::TimeoutT6 => Self::T6Timeout,
            secs_hsms::HsmsError::TimeoutT3 => Self::T3Timeout,
            secs_hsms::HsmsError::Rejected => Self::Rejected,
        }
    }
}
