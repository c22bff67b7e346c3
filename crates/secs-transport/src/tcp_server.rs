use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use secs_timing::{Duration, Repeater};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::Transport;

/// HSMS-SS server-side link: binds once, accepts the single long-lived
/// connection, and re-binds no more than once per `rebind` interval if the
/// listener itself needs to be recreated.
pub struct TcpServerTransport {
    bind_addr: String,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    rebind: Repeater,
}

impl TcpServerTransport {
    pub fn new(bind_addr: impl Into<String>, rebind_interval: Duration) -> Self {
        let mut rebind = Repeater::every(rebind_interval);
        rebind.force_fire();
        Self { bind_addr: bind_addr.into(), listener: None, stream: None, rebind }
    }

    fn ensure_listening(&mut self) -> Result<(), TransportError> {
        if self.listener.is_some() {
            return Ok(());
        }
        if !self.rebind.fired() {
            return Err(TransportError::NotConnected);
        }
        match TcpListener::bind(&self.bind_addr) {
            Ok(listener) => {
                debug!(addr = %self.bind_addr, "hsms server bound");
                self.listener = Some(listener);
                Ok(())
            }
            Err(e) => {
                warn!(addr = %self.bind_addr, error = %e, "hsms server bind failed");
                Err(e.into())
            }
        }
    }

    /// Blocks until the single connection is accepted, (re)binding first if needed.
    pub fn accept(&mut self) -> Result<(), TransportError> {
        self.ensure_listening()?;
        let listener = self.listener.as_ref().expect("ensure_listening populates this");
        let (stream, peer) = listener.accept()?;
        stream.set_nodelay(true).ok();
        debug!(%peer, "hsms server accepted connection");
        self.stream = Some(stream);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Transport for TcpServerTransport {
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
        Ok(Box::new(TcpServerTransport {
            bind_addr: self.bind_addr.clone(),
            listener: None,
            stream: Some(cloned),
            rebind: Repeater::every(self.rebind.interval()),
        }))
    }
}
