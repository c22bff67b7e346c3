use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use secs_circuit::{Circuit, CircuitConfig};
use secs_communication::{ByteMessageQueue, ReplyOutcome as Secs1ReplyOutcome, SendReplyPool, Transaction};
use secs_hsms::{CommunicateState, HsmsConfig, HsmsSession, ReplyPool as HsmsReplyPool};
use secs_protocol::{Block, Message, SystemBytesGenerator};
use secs_timing::Duration;
use secs_transport::{SerialTransport, TcpClientTransport, TcpServerTransport, Transport};
use secs_utils::{ThreadPriority, thread_boot};
use tracing::{info, warn};

use crate::config::{CommunicatorConfig, CommunicatorKind};
use crate::error::{CommunicatorError, UsageError};
use crate::sink::FacadeSink;
use crate::sml::SmlParser;

/// Never-timeout bound for waits the circuit/HSMS layers already bound
/// themselves (ENQ/EOT/ACK retries, T6 select/linktest) — the façade's
/// `send`/`reply` only need a deadline in case the backend is torn down
/// without ever resolving the transaction, which `broadcast_closed` covers.
const FOREVER: Duration = Duration::from_secs(24 * 3600);

/// Per-send handles cheap enough to clone out from under a lock before a
/// (possibly long) blocking wait, so one in-flight `send` never blocks
/// another or blocks `close()`.
#[derive(Clone)]
enum BackendSend {
    Secs1 { queue: Arc<ByteMessageQueue>, pool: Arc<SendReplyPool>, system_bytes: Arc<Mutex<SystemBytesGenerator>> },
    Hsms { session: Arc<HsmsSession<FacadeSink>> },
}

/// Resources only `close()` touches; consumed exactly once.
enum BackendShutdown {
    Secs1 { queue: Arc<ByteMessageQueue>, pool: Arc<SendReplyPool>, worker: JoinHandle<()> },
    Hsms { session: Arc<HsmsSession<FacadeSink>>, stop: Arc<AtomicBool>, reader: JoinHandle<()> },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Unopened,
    Open,
    Closed,
}

/// The public façade unifying the SECS-I circuit engine and the HSMS-SS
/// session behind one send/reply/listener API. Holds no protocol logic of
/// its own — it only wires together the lower crates and routes a call to
/// whichever backend `CommunicatorKind` selected.
pub struct Communicator {
    config: CommunicatorConfig,
    kind: CommunicatorKind,
    sink: Arc<FacadeSink>,
    communicate_state: Arc<secs_hsms::CommunicateStateCell>,
    sml_parser: Option<Arc<dyn SmlParser>>,
    lifecycle: Mutex<Lifecycle>,
    send_handles: Mutex<Option<BackendSend>>,
    shutdown_handles: Mutex<Option<BackendShutdown>>,
}

impl Communicator {
    pub fn new(config: CommunicatorConfig, kind: CommunicatorKind) -> Self {
        Self {
            config,
            kind,
            sink: FacadeSink::new(),
            communicate_state: Arc::new(secs_hsms::CommunicateStateCell::new()),
            sml_parser: None,
            lifecycle: Mutex::new(Lifecycle::Unopened),
            send_handles: Mutex::new(None),
            shutdown_handles: Mutex::new(None),
        }
    }

    pub fn with_sml_parser(mut self, parser: Arc<dyn SmlParser>) -> Self {
        self.sml_parser = Some(parser);
        self
    }

    // ---- lifecycle -----------------------------------------------------

    /// Opens the link and spawns the backend's worker thread(s). A
    /// communicator may be opened exactly once in its lifetime (§3).
    pub fn open(&self) -> Result<(), CommunicatorError> {
        self.config.validate()?;
        {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            match *lifecycle {
                Lifecycle::Open => return Err(UsageError::AlreadyOpen.into()),
                Lifecycle::Closed => return Err(UsageError::ReopenAfterClose.into()),
                Lifecycle::Unopened => *lifecycle = Lifecycle::Open,
            }
        }

        let (send, shutdown) = match self.open_backend() {
            Ok(pair) => pair,
            Err(e) => {
                *self.lifecycle.lock().unwrap() = Lifecycle::Unopened;
                return Err(e);
            }
        };

        *self.send_handles.lock().unwrap() = Some(send);
        *self.shutdown_handles.lock().unwrap() = Some(shutdown);
        info!(name = self.config.name.as_deref().unwrap_or(""), "communicator opened");
        Ok(())
    }

    fn open_backend(&self) -> Result<(BackendSend, BackendShutdown), CommunicatorError> {
        match &self.kind {
            CommunicatorKind::Secs1 { path, baud } => {
                let transport = SerialTransport::open(path, *baud)?;
                let queue = Arc::new(ByteMessageQueue::new());
                let pool = Arc::new(SendReplyPool::new());
                let circuit_config = CircuitConfig {
                    device_id: self.config.device_id,
                    is_master: self.config.is_master,
                    retry: self.config.retry,
                    t1: self.config.timeout_t1,
                    t2: self.config.timeout_t2,
                    t4: self.config.timeout_t4,
                };
                let circuit = Circuit::new(Box::new(transport), queue.clone(), pool.clone(), self.sink.clone(), circuit_config);
                let worker = std::thread::Builder::new()
                    .name("secs-circuit".into())
                    .spawn(move || {
                        thread_boot(None, ThreadPriority::OSDefault);
                        if let Err(e) = circuit.run() {
                            warn!(?e, "circuit worker panicked");
                        }
                    })
                    .expect("spawn circuit worker");

                self.set_communicate_state(CommunicateState::Connected);

                let system_bytes = Arc::new(Mutex::new(SystemBytesGenerator::new(self.config.device_id, self.config.is_equip)));
                Ok((
                    BackendSend::Secs1 { queue: queue.clone(), pool: pool.clone(), system_bytes },
                    BackendShutdown::Secs1 { queue, pool, worker },
                ))
            }
            CommunicatorKind::HsmsActive { addr } => {
                let mut client = TcpClientTransport::new(addr.clone(), self.config.reconnect);
                while client.ensure_connected().is_err() {
                    std::thread::sleep(Duration::from_millis(50));
                }
                self.set_communicate_state(CommunicateState::Connected);
                let read_half = client.try_clone()?;
                let (session, stop, reader) = self.spawn_hsms(Box::new(client), read_half);
                session.send_select_req()?;
                Ok((BackendSend::Hsms { session: session.clone() }, BackendShutdown::Hsms { session, stop, reader }))
            }
            CommunicatorKind::HsmsPassive { bind_addr } => {
                let mut server = TcpServerTransport::new(bind_addr.clone(), self.config.rebind);
                server.accept()?;
                self.set_communicate_state(CommunicateState::Connected);
                let read_half = server.try_clone()?;
                let (session, stop, reader) = self.spawn_hsms(Box::new(server), read_half);
                Ok((BackendSend::Hsms { session: session.clone() }, BackendShutdown::Hsms { session, stop, reader }))
            }
        }
    }

    /// Builds the `HsmsSession` and spawns its dedicated reader thread —
    /// grounded on `HsmsSsConnection2`'s single inbound reader plus the
    /// send-lock-guarded writer in `hsmssscommunicator.py`.
    fn spawn_hsms(
        &self,
        write: Box<dyn Transport>,
        read: Box<dyn Transport>,
    ) -> (Arc<HsmsSession<FacadeSink>>, Arc<AtomicBool>, JoinHandle<()>) {
        let hsms_config = HsmsConfig {
            device_id: self.config.device_id,
            is_equip: self.config.is_equip,
            t3: self.config.timeout_t3,
            t6: self.config.timeout_t6,
            t8: self.config.timeout_t8,
        };
        let session = Arc::new(HsmsSession::new(
            write,
            Arc::new(HsmsReplyPool::new()),
            self.sink.clone(),
            self.communicate_state.clone(),
            hsms_config,
        ));
        let stop = Arc::new(AtomicBool::new(false));
        let reader_session = session.clone();
        let reader_stop = stop.clone();
        let reader = std::thread::Builder::new()
            .name("secs-hsms-reader".into())
            .spawn(move || {
                thread_boot(None, ThreadPriority::OSDefault);
                reader_session.run_reader(read, reader_stop);
            })
            .expect("spawn hsms reader");
        (session, stop, reader)
    }

    fn set_communicate_state(&self, state: CommunicateState) {
        if self.communicate_state.set(state) {
            self.sink.listeners.communicate_state.publish(state);
        }
    }

    /// Blocks until the link reaches its fully-communicating state:
    /// `Connected` for SECS-I (there's no selection handshake), `Selected`
    /// for HSMS-SS (after Select.req/rsp completes).
    pub fn open_and_wait_until_communicating(&self, timeout: Duration) -> Result<(), CommunicatorError> {
        self.open()?;
        let target = match &self.kind {
            CommunicatorKind::Secs1 { .. } => CommunicateState::Connected,
            CommunicatorKind::HsmsActive { .. } | CommunicatorKind::HsmsPassive { .. } => CommunicateState::Selected,
        };
        let reached = self.communicate_state.wait_for(|s| s == target, timeout);
        if reached == target {
            Ok(())
        } else {
            Err(CommunicatorError::T6Timeout)
        }
    }

    /// Idempotent: closing an already-closed (or never-opened) communicator
    /// is a silent no-op, matching §4.6.
    pub fn close(&self) -> Result<(), CommunicatorError> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if !matches!(*lifecycle, Lifecycle::Open) {
            *lifecycle = Lifecycle::Closed;
            return Ok(());
        }
        *lifecycle = Lifecycle::Closed;
        drop(lifecycle);

        *self.send_handles.lock().unwrap() = None;
        if let Some(shutdown) = self.shutdown_handles.lock().unwrap().take() {
            match shutdown {
                BackendShutdown::Secs1 { queue, pool, worker } => {
                    pool.broadcast_closed();
                    queue.shutdown();
                    let _ = worker.join();
                }
                BackendShutdown::Hsms { session, stop, reader } => {
                    stop.store(true, Ordering::SeqCst);
                    session.shutdown();
                    let _ = reader.join();
                }
            }
        }
        self.set_communicate_state(CommunicateState::NotConnect);
        info!(name = self.config.name.as_deref().unwrap_or(""), "communicator closed");
        Ok(())
    }

    fn snapshot_send(&self) -> Result<BackendSend, CommunicatorError> {
        self.send_handles.lock().unwrap().clone().ok_or(CommunicatorError::Closed)
    }

    // ---- send / reply ---------------------------------------------------

    /// Sends a primary message. Blocks until sent; if `w_bit`, blocks
    /// further until a reply arrives or T3 elapses, returning it.
    pub fn send(&self, stream: u8, function: u8, w_bit: bool, body: Vec<u8>) -> Result<Option<Message>, CommunicatorError> {
        match self.snapshot_send()? {
            BackendSend::Secs1 { queue, pool, system_bytes } => {
                let system_bytes = system_bytes.lock().unwrap().next();
                let msg = Message::new(self.config.device_id, stream, function, w_bit, system_bytes, body);
                let tx = Arc::new(Transaction::new(msg.clone()));
                pool.register(tx.clone())?;
                queue.entry_tx(tx.clone());

                if let Err(e) = tx.await_sent(FOREVER) {
                    pool.unregister(system_bytes);
                    return Err(e.into());
                }
                self.sink.listeners.sent.publish(msg);

                if !w_bit {
                    pool.unregister(system_bytes);
                    return Ok(None);
                }

                let outcome = tx.await_reply(self.config.timeout_t3);
                pool.unregister(system_bytes);
                match outcome {
                    Ok(Secs1ReplyOutcome::Reply(reply)) => Ok(Some(reply)),
                    Ok(Secs1ReplyOutcome::NoReply) => Err(CommunicatorError::T3Timeout),
                    Err(e) => Err(e.into()),
                }
            }
            BackendSend::Hsms { session } => {
                let system_bytes = session.next_system_bytes();
                let msg = Message::new(self.config.device_id, stream, function, w_bit, system_bytes, body);
                session.send_data(msg).map_err(CommunicatorError::from)
            }
        }
    }

    pub fn send_sml(&self, sml: &str) -> Result<Option<Message>, CommunicatorError> {
        let parser = self.sml_parser.as_ref().ok_or(UsageError::NoSmlParser)?;
        let (stream, function, w_bit, body) = parser.parse(sml).map_err(CommunicatorError::ParseError)?;
        self.send(stream, function, w_bit, body)
    }

    /// Answers `primary` with the same system-bytes. Never waits for a
    /// reply of its own — `w_bit` must be false (a reply never itself
    /// expects a reply, §4.6).
    pub fn reply(&self, primary: &Message, stream: u8, function: u8, w_bit: bool, body: Vec<u8>) -> Result<(), CommunicatorError> {
        if w_bit {
            return Err(UsageError::ReplyMustNotSetWBit.into());
        }
        let msg = Message::new(self.config.device_id, stream, function, false, primary.system_bytes, body);
        match self.snapshot_send()? {
            BackendSend::Secs1 { queue, .. } => {
                let tx = Arc::new(Transaction::new(msg.clone()));
                queue.entry_tx(tx.clone());
                tx.await_sent(FOREVER)?;
                self.sink.listeners.sent.publish(msg);
                Ok(())
            }
            BackendSend::Hsms { session } => {
                session.send_data(msg)?;
                Ok(())
            }
        }
    }

    pub fn reply_sml(&self, primary: &Message, sml: &str) -> Result<(), CommunicatorError> {
        let parser = self.sml_parser.as_ref().ok_or(UsageError::NoSmlParser)?;
        let (stream, function, w_bit, body) = parser.parse(sml).map_err(CommunicatorError::ParseError)?;
        self.reply(primary, stream, function, w_bit, body)
    }

    // ---- listeners -------------------------------------------------------

    pub fn on_recv_primary<F: Fn(&Message) + Send + Sync + 'static>(&self, f: F) {
        self.sink.listeners.recv_primary.register(f);
    }

    pub fn on_recv_all<F: Fn(&Message) + Send + Sync + 'static>(&self, f: F) {
        self.sink.listeners.recv_all.register(f);
    }

    pub fn on_sent<F: Fn(&Message) + Send + Sync + 'static>(&self, f: F) {
        self.sink.listeners.sent.register(f);
    }

    pub fn on_error<F: Fn(&CommunicatorError) + Send + Sync + 'static>(&self, f: F) {
        self.sink.listeners.error.register(f);
    }

    pub fn on_communicate_state<F: Fn(&CommunicateState) + Send + Sync + 'static>(&self, f: F) {
        self.sink.listeners.communicate_state.register(f);
    }

    pub fn on_recv_block<F: Fn(&Block) + Send + Sync + 'static>(&self, f: F) {
        self.sink.listeners.recv_block.register(f);
    }

    pub fn on_try_send_block<F: Fn(&Block) + Send + Sync + 'static>(&self, f: F) {
        self.sink.listeners.try_send_block.register(f);
    }

    pub fn on_sent_block<F: Fn(&Block) + Send + Sync + 'static>(&self, f: F) {
        self.sink.listeners.sent_block.register(f);
    }

    pub fn on_circuit_error<F: Fn(&secs_circuit::CircuitDiagnostic) + Send + Sync + 'static>(&self, f: F) {
        self.sink.listeners.circuit_error.register(f);
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
