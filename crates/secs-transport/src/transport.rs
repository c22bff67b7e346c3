use secs_timing::Duration;

use crate::error::TransportError;

/// The byte-stream contract the circuit/HSMS engines consume. A serial
/// device abstraction beyond this is out of scope — callers treat the link
/// as open/read/write/close plus a byte-count probe for serial.
pub trait Transport: Send {
    /// Blocking read of up to `buf.len()` bytes, bounded by the most recent
    /// `set_read_timeout`. Returns `Ok(0)` if the deadline elapsed with
    /// nothing to read; a closed peer is surfaced as an `Err` instead.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;

    /// The engine sets this before each read to the currently active timer
    /// (T1 inter-character, T2 control response, T4 inter-block, T8 network).
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Bytes known to be available without blocking. Serial-only; TCP
    /// transports report 0 and rely on `read`'s timeout instead.
    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(0)
    }

    /// An independent handle onto the same underlying link, so a dedicated
    /// reader thread can block in `read` while the engine thread writes
    /// without contending on a shared lock. Transports that can't duplicate
    /// their handle return `TransportError::NotConnected`.
    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError>;
}
