use std::io::{Read, Write};
use std::net::TcpStream;

use secs_timing::{Duration, Repeater};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::Transport;

/// HSMS-SS client-side link: dials out, and re-dials no more than once per
/// `reconnect` interval after a drop — mirroring the `reconnect` config knob.
pub struct TcpClientTransport {
    addr: String,
    stream: Option<TcpStream>,
    reconnect: Repeater,
}

impl TcpClientTransport {
    pub fn new(addr: impl Into<String>, reconnect_interval: Duration) -> Self {
        let mut reconnect = Repeater::every(reconnect_interval);
        reconnect.force_fire();
        Self { addr: addr.into(), stream: None, reconnect }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Attempts a connection if not already connected and the reconnect
    /// interval has elapsed. A no-op (`Ok(())`) otherwise, including when the
    /// interval hasn't elapsed yet.
    pub fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        if !self.reconnect.fired() {
            return Err(TransportError::NotConnected);
        }
        match TcpStream::connect(&self.addr) {
            Ok(stream) => {
                stream.set_nodelay(true).ok();
                debug!(addr = %self.addr, "hsms client connected");
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "hsms client connect failed");
                Err(e.into())
            }
        }
    }
}

impl Transport for TcpClientTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        match stream.read(buf) {
            Ok(0) => {
                self.stream = None;
                Err(TransportError::NotConnected)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                self.stream = None;
                Err(e.into())
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(e) = stream.write_all(buf) {
            self.stream = None;
            return Err(e.into());
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(Some(timeout))?;
        }
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;
        let cloned = stream.try_clone()?;
        Ok(Box::new(TcpClientTransport {
            addr: self.addr.clone(),
            stream: Some(cloned),
            reconnect: Repeater::every(self.reconnect.interval()),
        }))
    }
}
