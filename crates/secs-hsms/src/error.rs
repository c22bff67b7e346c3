use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HsmsError {
    #[error("network timeout (T8)")]
    TimeoutT8,
    #[error("connection closed")]
    Closed,
    #[error("malformed frame")]
    Framing,
    #[error("select/linktest reply timed out (T6)")]
    TimeoutT6,
    #[error("W-bit data message received no reply (T3)")]
    TimeoutT3,
    #[error("peer rejected the request")]
    Rejected,
}
