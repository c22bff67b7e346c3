use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use secs_protocol::{Message, SystemBytesGenerator};
use secs_timing::Duration;
use secs_transport::Transport;
use tracing::{debug, warn};

use crate::control::{
    DESELECT_REQ, DESELECT_RSP, LINKTEST_REQ, LINKTEST_RSP, REJECT_REQ, SELECT_REQ, SELECT_RSP, SEPARATE_REQ,
};
use crate::error::HsmsError;
use crate::frame::Frame;
use crate::framer::read_frame;
use crate::reply::{ReplyOutcome, ReplyPool};
use crate::state::{CommunicateState, CommunicateStateCell};

pub struct HsmsConfig {
    pub device_id: u16,
    pub is_equip: bool,
    pub t3: Duration,
    pub t6: Duration,
    pub t8: Duration,
}

/// Everything an HSMS session reports upward, implemented by the façade to
/// fan out into per-category listener delivery workers (mirrors
/// `secs_circuit::CircuitSink` on the SECS-I side).
pub trait HsmsSink: Send + Sync {
    fn on_recv_primary(&self, msg: Message);
    fn on_recv_all(&self, msg: Message);
    fn on_sent(&self, msg: Message);
    fn on_error(&self, err: HsmsError);
    fn on_communicate_state(&self, state: CommunicateState);
}

/// Drives one HSMS-SS logical connection. The write half is guarded by a
/// lock so `send_*` calls from any thread serialise cleanly; the read half
/// is driven independently by `run_reader`, normally on its own thread —
/// grounded on `HsmsSsConnection2`'s `_send_lock` plus its single inbound
/// reader submitting work to a thread pool.
pub struct HsmsSession<S: HsmsSink> {
    write: Mutex<Box<dyn Transport>>,
    pool: Arc<ReplyPool>,
    sink: Arc<S>,
    state: Arc<CommunicateStateCell>,
    system_bytes: Mutex<SystemBytesGenerator>,
    config: HsmsConfig,
}

impl<S: HsmsSink + 'static> HsmsSession<S> {
    pub fn new(
        write_transport: Box<dyn Transport>,
        pool: Arc<ReplyPool>,
        sink: Arc<S>,
        state: Arc<CommunicateStateCell>,
        config: HsmsConfig,
    ) -> Self {
        let system_bytes = SystemBytesGenerator::new(config.device_id, config.is_equip);
        Self { write: Mutex::new(write_transport), pool, sink, state, system_bytes: Mutex::new(system_bytes), config }
    }

    pub fn next_system_bytes(&self) -> [u8; 4] {
        self.system_bytes.lock().unwrap().next()
    }

    fn write_frame(&self, frame: &Frame) -> Result<(), HsmsError> {
        self.write.lock().unwrap().write_all(&frame.encode()).map_err(|e| {
            warn!(error = %e, s_type = frame.header.s_type(), "hsms write failed");
            HsmsError::Closed
        })
    }

    /// Sends a data message. Blocks up to T3 for a reply when `msg.w_bit`.
    pub fn send_data(&self, msg: Message) -> Result<Option<Message>, HsmsError> {
        let frame = Frame::data_message(&msg);
        if !msg.w_bit {
            self.write_frame(&frame)?;
            self.sink.on_sent(msg);
            return Ok(None);
        }
        let pending = self.pool.register(msg.system_bytes);
        if let Err(e) = self.write_frame(&frame) {
            self.pool.unregister(msg.system_bytes);
            return Err(e);
        }
        self.sink.on_sent(msg);
        let outcome = pending.wait(self.config.t3);
        self.pool.unregister(msg.system_bytes);
        match outcome {
            ReplyOutcome::Reply(reply) => Ok(Some(reply.to_message())),
            ReplyOutcome::Rejected => Err(HsmsError::Rejected),
            ReplyOutcome::Closed => Err(HsmsError::Closed),
            ReplyOutcome::Timeout => Err(HsmsError::TimeoutT3),
        }
    }

    fn send_control_awaiting(&self, frame: Frame, system_bytes: [u8; 4]) -> Result<Frame, HsmsError> {
        let pending = self.pool.register(system_bytes);
        if let Err(e) = self.write_frame(&frame) {
            self.pool.unregister(system_bytes);
            return Err(e);
        }
        let outcome = pending.wait(self.config.t6);
        self.pool.unregister(system_bytes);
        match outcome {
            ReplyOutcome::Reply(reply) => Ok(reply),
            ReplyOutcome::Rejected => Err(HsmsError::Rejected),
            ReplyOutcome::Closed => Err(HsmsError::Closed),
            ReplyOutcome::Timeout => Err(HsmsError::TimeoutT6),
        }
    }

    /// Select.req, T6-bounded. The reader thread observes the matching
    /// Select.rsp too and moves `state` to `Selected` on status 0.
    pub fn send_select_req(&self) -> Result<(), HsmsError> {
        let system_bytes = self.next_system_bytes();
        let frame = Frame::control(self.config.device_id, SELECT_REQ, 0, system_bytes, vec![]);
        let reply = self.send_control_awaiting(frame, system_bytes)?;
        if reply.header.function() != 0 {
            return Err(HsmsError::Rejected);
        }
        Ok(())
    }

    /// Answers a received Select.req. Takes only `primary` — the Python
    /// original's `send_select_rsp` erroneously passes `self` as an extra
    /// positional argument to its message builder; that bug is not
    /// reproduced here.
    pub fn send_select_rsp(&self, primary: &Message, status: u8) -> Result<(), HsmsError> {
        let frame = Frame::control(self.config.device_id, SELECT_RSP, status, primary.system_bytes, vec![]);
        self.write_frame(&frame)
    }

    pub fn send_linktest_req(&self) -> Result<(), HsmsError> {
        let system_bytes = self.next_system_bytes();
        let frame = Frame::control(self.config.device_id, LINKTEST_REQ, 0, system_bytes, vec![]);
        self.send_control_awaiting(frame, system_bytes)?;
        Ok(())
    }

    pub fn send_linktest_rsp(&self, primary: &Message) -> Result<(), HsmsError> {
        let frame = Frame::control(self.config.device_id, LINKTEST_RSP, 0, primary.system_bytes, vec![]);
        self.write_frame(&frame)
    }

    pub fn send_reject_req(&self, primary: &Message, reason: u8) -> Result<(), HsmsError> {
        let frame = Frame::control(self.config.device_id, REJECT_REQ, reason, primary.system_bytes, vec![]);
        self.write_frame(&frame)
    }

    pub fn send_separate_req(&self) -> Result<(), HsmsError> {
        let system_bytes = self.next_system_bytes();
        let frame = Frame::control(self.config.device_id, SEPARATE_REQ, 0, system_bytes, vec![]);
        self.write_frame(&frame)?;
        if self.state.set(CommunicateState::NotConnect) {
            self.sink.on_communicate_state(CommunicateState::NotConnect);
        }
        Ok(())
    }

    /// Closes the write half of the transport, unblocking the reader thread's
    /// next `read` call and waking every pending request as closed. Called
    /// once from the façade's teardown path.
    pub fn shutdown(&self) {
        let _ = self.write.lock().unwrap().close();
        self.pool.broadcast_closed();
    }

    /// Runs the blocking frame-reader loop until `stop` is set or the
    /// transport closes. Meant to run on its own thread, fed
    /// `write`'s `try_clone()`, mirroring the reader/writer split
    /// `secs_circuit::Circuit` uses.
    pub fn run_reader(&self, mut read_transport: Box<dyn Transport>, stop: Arc<AtomicBool>) {
        loop {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            match read_frame(read_transport.as_mut(), self.config.t8, &|| stop.load(Ordering::SeqCst)) {
                Ok(frame) => self.dispatch(frame),
                Err(HsmsError::Closed) => {
                    self.pool.broadcast_closed();
                    if self.state.set(CommunicateState::NotConnect) {
                        self.sink.on_communicate_state(CommunicateState::NotConnect);
                    }
                    return;
                }
                Err(e) => self.sink.on_error(e),
            }
        }
    }

    fn dispatch(&self, frame: Frame) {
        if frame.header.s_type() == 0 {
            let msg = frame.to_message();
            self.sink.on_recv_all(msg.clone());
            if !self.pool.notify_reply(&frame) {
                self.sink.on_recv_primary(msg);
            }
            return;
        }

        match frame.header.s_type() {
            SELECT_REQ => {
                let primary = frame.to_message();
                debug!(device_id = self.config.device_id, "received select.req, auto-answering");
                if self.send_select_rsp(&primary, 0).is_ok() && self.state.set(CommunicateState::Selected) {
                    self.sink.on_communicate_state(CommunicateState::Selected);
                }
            }
            LINKTEST_REQ => {
                let primary = frame.to_message();
                let _ = self.send_linktest_rsp(&primary);
            }
            DESELECT_REQ => {
                let primary = frame.to_message();
                let rsp = Frame::control(self.config.device_id, DESELECT_RSP, 0, primary.system_bytes, vec![]);
                let _ = self.write_frame(&rsp);
                if self.state.set(CommunicateState::Connected) {
                    self.sink.on_communicate_state(CommunicateState::Connected);
                }
            }
            SEPARATE_REQ => {
                if self.state.set(CommunicateState::NotConnect) {
                    self.sink.on_communicate_state(CommunicateState::NotConnect);
                }
            }
            SELECT_RSP => {
                if frame.header.function() == 0 && self.state.set(CommunicateState::Selected) {
                    self.sink.on_communicate_state(CommunicateState::Selected);
                }
                self.pool.notify_reply(&frame);
            }
            _ => {
                // LINKTEST_RSP, REJECT_REQ, DESELECT_RSP: reply-correlated only.
                self.pool.notify_reply(&frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Mutex as StdMutex;
    use std::thread;

    use secs_transport::TransportError;

    use super::*;

    /// Minimal `Transport` over a bare `TcpStream`, standing in for
    /// `secs_transport::TcpClientTransport` so this test doesn't need a
    /// connect/accept dance on top of a pre-established pair.
    struct RawTcp(TcpStream);

    impl Transport for RawTcp {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            match self.0.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(e.into()),
            }
        }
        fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
            self.0.write_all(buf).map_err(Into::into)
        }
        fn close(&mut self) -> Result<(), TransportError> {
            let _ = self.0.shutdown(std::net::Shutdown::Both);
            Ok(())
        }
        fn set_read_timeout(&mut self, timeout: secs_timing::Duration) -> Result<(), TransportError> {
            self.0.set_read_timeout(Some(timeout)).map_err(Into::into)
        }
        fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
            Ok(Box::new(RawTcp(self.0.try_clone()?)))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        primaries: StdMutex<Vec<Message>>,
        states: StdMutex<Vec<CommunicateState>>,
    }

    impl HsmsSink for RecordingSink {
        fn on_recv_primary(&self, msg: Message) {
            self.primaries.lock().unwrap().push(msg);
        }
        fn on_recv_all(&self, _msg: Message) {}
        fn on_sent(&self, _msg: Message) {}
        fn on_error(&self, _err: HsmsError) {}
        fn on_communicate_state(&self, state: CommunicateState) {
            self.states.lock().unwrap().push(state);
        }
    }

    fn connected_pair() -> (Box<dyn Transport>, Box<dyn Transport>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || listener.accept().unwrap().0);
        let client = TcpStream::connect(addr).unwrap();
        let server = server.join().unwrap();
        client.set_nodelay(true).ok();
        server.set_nodelay(true).ok();
        (Box::new(RawTcp(client)), Box::new(RawTcp(server)))
    }

    #[test]
    fn select_req_gets_auto_answered_and_selects_both_sides() {
        let (client_t, server_t) = connected_pair();
        let client_reader = client_t.try_clone().unwrap();
        let server_reader = server_t.try_clone().unwrap();

        let client_sink = Arc::new(RecordingSink::default());
        let client_state = Arc::new(CommunicateStateCell::new());
        let client = Arc::new(HsmsSession::new(
            client_t,
            Arc::new(ReplyPool::new()),
            client_sink,
            client_state.clone(),
            HsmsConfig { device_id: 0, is_equip: false, t3: Duration::from_secs(1), t6: Duration::from_secs(1), t8: Duration::from_secs(1) },
        ));

        let server_sink = Arc::new(RecordingSink::default());
        let server_state = Arc::new(CommunicateStateCell::new());
        let server = Arc::new(HsmsSession::new(
            server_t,
            Arc::new(ReplyPool::new()),
            server_sink,
            server_state.clone(),
            HsmsConfig { device_id: 0, is_equip: true, t3: Duration::from_secs(1), t6: Duration::from_secs(1), t8: Duration::from_secs(1) },
        ));

        let stop = Arc::new(AtomicBool::new(false));
        let client2 = client.clone();
        let stop2 = stop.clone();
        thread::spawn(move || client2.run_reader(client_reader, stop2));
        let server2 = server.clone();
        let stop3 = stop.clone();
        thread::spawn(move || server2.run_reader(server_reader, stop3));

        client.send_select_req().unwrap();

        let client_selected = client_state.wait_for(|s| s == CommunicateState::Selected, Duration::from_secs(2));
        let server_selected = server_state.wait_for(|s| s == CommunicateState::Selected, Duration::from_secs(2));
        assert_eq!(client_selected, CommunicateState::Selected);
        assert_eq!(server_selected, CommunicateState::Selected);

        stop.store(true, Ordering::SeqCst);
    }
}
