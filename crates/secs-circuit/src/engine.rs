use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use secs_communication::{ByteMessageQueue, Polled, SendReplyPool, Transaction, TransactionError};
use secs_protocol::{Block, Message};
use secs_timing::Duration;
use secs_transport::Transport;
use secs_utils::{ThreadPriority, thread_boot};
use tracing::{debug, warn};

use crate::config::CircuitConfig;
use crate::control::{ACK, ENQ, EOT, NAK};
use crate::diagnostic::CircuitDiagnostic;
use crate::error::EngineError;
use crate::sink::CircuitSink;

/// Drives the half-duplex SECS-I circuit: one worker thread owns the write
/// half of the transport and the protocol state machine; a second,
/// independent reader thread owns the read half and feeds raw bytes into
/// `queue`. The façade's `send()` enqueues transactions into the same queue,
/// so the circuit loop naturally interleaves outbound sends with inbound
/// receives as bytes and transactions arrive.
pub struct Circuit<S: CircuitSink> {
    writer: Box<dyn Transport>,
    queue: Arc<ByteMessageQueue>,
    pool: Arc<SendReplyPool>,
    sink: Arc<S>,
    config: CircuitConfig,
    reassembly: Vec<Block>,
}

/// Bounds how long the top-level loop waits for either a byte or a
/// transaction before looping back around to re-check for shutdown.
const IDLE_POLL: Duration = Duration::from_secs(1);
/// Reader-thread read granularity; small enough to notice shutdown promptly.
const READER_TICK: Duration = Duration::from_millis(200);

impl<S: CircuitSink + 'static> Circuit<S> {
    pub fn new(
        transport: Box<dyn Transport>,
        queue: Arc<ByteMessageQueue>,
        pool: Arc<SendReplyPool>,
        sink: Arc<S>,
        config: CircuitConfig,
    ) -> Self {
        Self { writer: transport, queue, pool, sink, config, reassembly: Vec::new() }
    }

    /// Spawns the reader thread and runs the circuit loop on the caller's
    /// thread (the façade boots this on its own dedicated worker). Returns
    /// once `queue.shutdown()` is observed.
    pub fn run(mut self) -> std::thread::Result<()> {
        let reader_transport = self.writer.try_clone();
        let stop = Arc::new(AtomicBool::new(false));
        let reader_handle = reader_transport
            .ok()
            .map(|transport| spawn_reader(transport, self.queue.clone(), self.sink.clone(), stop.clone()));

        self.drive();

        stop.store(true, Ordering::SeqCst);
        let _ = self.writer.close();
        if let Some(handle) = reader_handle {
            let _ = handle.join();
        }
        Ok(())
    }

    fn drive(&mut self) {
        loop {
            match self.queue.poll_either(IDLE_POLL) {
                Polled::Terminated => return,
                Polled::Timeout => continue,
                Polled::Tx(tx) => self.drive_send(&tx),
                Polled::Byte(b) if b == ENQ => self.receive_subprotocol(),
                Polled::Byte(_) => self.queue.drain_bytes(self.config.t1),
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), ()> {
        self.writer.write_all(&[byte]).map_err(|e| {
            warn!(error = %e, "circuit write failed");
        })
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ()> {
        self.writer.write_all(bytes).map_err(|e| {
            warn!(error = %e, "circuit write failed");
        })
    }

    fn drive_send(&mut self, tx: &Arc<Transaction>) {
        let blocks = match tx.message.into_blocks() {
            Ok(blocks) => blocks,
            Err(e) => {
                tx.notify_exception(TransactionError::SendError(e.to_string()));
                return;
            }
        };

        let mut cursor = 0usize;
        let mut attempt = 0u32;

        while attempt <= self.config.retry {
            if self.write_byte(ENQ).is_err() {
                tx.notify_exception(TransactionError::SendError("transport write failed".into()));
                return;
            }

            match self.queue.poll_byte(self.config.t2) {
                Polled::Terminated => {
                    tx.notify_exception(TransactionError::CommunicatorClosed);
                    return;
                }
                Polled::Timeout => {
                    self.sink.on_circuit_error(CircuitDiagnostic::TimeoutT2WaitingEot);
                    attempt += 1;
                    self.sink.on_circuit_error(CircuitDiagnostic::RetryCountUp { attempt });
                }
                Polled::Byte(ENQ) if !self.config.is_master => {
                    self.receive_subprotocol();
                    attempt = 0;
                    cursor = 0;
                }
                Polled::Byte(ENQ) => {
                    // master: ignore the contending ENQ and keep this send turn.
                }
                Polled::Byte(EOT) => match self.send_block(&blocks[cursor]) {
                    Ok(()) => {
                        if blocks[cursor].header.e_bit() {
                            tx.notify_sent();
                            return;
                        }
                        cursor += 1;
                        attempt = 0;
                    }
                    Err(()) => {
                        attempt += 1;
                        self.sink.on_circuit_error(CircuitDiagnostic::RetryCountUp { attempt });
                    }
                },
                Polled::Byte(_) | Polled::Tx(_) => {
                    attempt += 1;
                    self.sink.on_circuit_error(CircuitDiagnostic::RetryCountUp { attempt });
                }
            }
        }

        tx.notify_exception(TransactionError::RetryOver);
    }

    fn send_block(&mut self, block: &Block) -> Result<(), ()> {
        self.sink.on_try_send_block(block);
        self.write_bytes(&block.encode())?;
        match self.queue.poll_byte(self.config.t2) {
            Polled::Byte(ACK) => {
                self.sink.on_sent_block(block);
                Ok(())
            }
            Polled::Timeout => {
                self.sink.on_circuit_error(CircuitDiagnostic::TimeoutT2WaitingAck);
                Err(())
            }
            _ => {
                self.sink.on_circuit_error(CircuitDiagnostic::ReceiveNotAck);
                Err(())
            }
        }
    }

    /// Entered on an inbound ENQ: drives steps 1-9 of §4.4's receive
    /// sub-protocol, recursing for each subsequent block of a multi-block
    /// message.
    fn receive_subprotocol(&mut self) {
        if self.write_byte(EOT).is_err() {
            return;
        }

        let len = match self.queue.poll_byte(self.config.t2) {
            Polled::Byte(b) => b,
            _ => {
                let _ = self.write_byte(NAK);
                self.sink.on_circuit_error(CircuitDiagnostic::TimeoutT2LengthByte);
                return;
            }
        };

        if !(10..=254).contains(&len) {
            self.queue.drain_bytes(self.config.t1);
            let _ = self.write_byte(NAK);
            self.sink.on_circuit_error(CircuitDiagnostic::LengthByteError { len });
            return;
        }

        let mut rest = Vec::with_capacity(usize::from(len) + 2);
        for _ in 0..(usize::from(len) + 2) {
            match self.queue.poll_byte(self.config.t1) {
                Polled::Byte(b) => rest.push(b),
                _ => {
                    let _ = self.write_byte(NAK);
                    self.sink.on_circuit_error(CircuitDiagnostic::TimeoutT1);
                    return;
                }
            }
        }

        let block = match secs_protocol::Block::decode(len, &rest) {
            Ok(block) => block,
            Err(secs_protocol::ProtocolError::SumCheckError) => {
                self.queue.drain_bytes(self.config.t1);
                let _ = self.write_byte(NAK);
                self.sink.on_circuit_error(CircuitDiagnostic::SumCheckError);
                return;
            }
            Err(_) => {
                let _ = self.write_byte(NAK);
                return;
            }
        };

        let _ = self.write_byte(ACK);
        self.sink.on_recv_block(&block);

        if block.header.device_id() != self.config.device_id {
            self.sink.on_circuit_error(CircuitDiagnostic::DeviceIdMismatch {
                local: self.config.device_id,
                received: block.header.device_id(),
            });
            return;
        }

        self.accumulate(block);
    }

    fn accumulate(&mut self, block: Block) {
        match self.reassembly.last() {
            None => self.reassembly.push(block.clone()),
            Some(prev) => {
                let prev_sys = prev.header.system_bytes();
                let prev_no = prev.header.block_number();
                let new_sys = block.header.system_bytes();
                let new_no = block.header.block_number();
                if new_sys == prev_sys && new_no == prev_no.wrapping_add(1) {
                    self.reassembly.push(block.clone());
                } else if new_sys == prev_sys && new_no == prev_no {
                    debug!("duplicate block retry ignored");
                } else {
                    self.reassembly.clear();
                    self.reassembly.push(block.clone());
                }
            }
        }

        if block.header.e_bit() {
            let blocks = std::mem::take(&mut self.reassembly);
            match Message::from_blocks(&blocks) {
                Ok(msg) => {
                    self.sink.on_recv_all(msg.clone());
                    if !self.pool.notify_reply(msg.clone()) {
                        self.sink.on_recv_primary(msg);
                    }
                }
                Err(e) => self.sink.on_error(EngineError::ParseError(e)),
            }
            return;
        }

        self.pool.notify_timer_reset(block.header.system_bytes());

        match self.queue.poll_byte(self.config.t4) {
            Polled::Byte(ENQ) => self.receive_subprotocol(),
            Polled::Timeout => self.sink.on_circuit_error(CircuitDiagnostic::TimeoutT4),
            Polled::Byte(b) => {
                self.sink.on_circuit_error(CircuitDiagnostic::ReceiveNotEnqOfNextBlock { byte: b });
            }
            Polled::Terminated | Polled::Tx(_) => {}
        }
    }
}

fn spawn_reader<S: CircuitSink + 'static>(
    mut transport: Box<dyn Transport>,
    queue: Arc<ByteMessageQueue>,
    sink: Arc<S>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        thread_boot(None, ThreadPriority::OSDefault);
        let mut buf = [0u8; 256];
        while !stop.load(Ordering::SeqCst) {
            if transport.set_read_timeout(READER_TICK).is_err() {
                break;
            }
            match transport.read(&mut buf) {
                Ok(0) => continue,
                Ok(n) => queue.put_bytes(&buf[..n]),
                Err(_) => {
                    if !stop.load(Ordering::SeqCst) {
                        sink.on_error(EngineError::TransportClosed);
                    }
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use secs_protocol::Header;
    use secs_transport::TransportError;

    use super::*;

    struct NullTransport;

    impl Transport for NullTransport {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
            Ok(0)
        }
        fn write_all(&mut self, _buf: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
            Ok(())
        }
        fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
            Ok(Box::new(NullTransport))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        primaries: Mutex<Vec<Message>>,
    }

    impl CircuitSink for RecordingSink {
        fn on_recv_primary(&self, msg: Message) {
            self.primaries.lock().unwrap().push(msg);
        }
        fn on_recv_all(&self, _msg: Message) {}
        fn on_recv_block(&self, _block: &Block) {}
        fn on_try_send_block(&self, _block: &Block) {}
        fn on_sent_block(&self, _block: &Block) {}
        fn on_circuit_error(&self, _diag: CircuitDiagnostic) {}
        fn on_error(&self, _err: EngineError) {}
    }

    fn test_block(system_bytes: [u8; 4], block_number: u16, e_bit: bool, body: Vec<u8>) -> Block {
        let header = Header::for_secs1_block(0, false, 1, true, 1, block_number, e_bit, system_bytes);
        Block { header, body }
    }

    fn test_circuit(sink: Arc<RecordingSink>) -> Circuit<RecordingSink> {
        let queue = Arc::new(ByteMessageQueue::new());
        let pool = Arc::new(SendReplyPool::new());
        let config = CircuitConfig {
            device_id: 0,
            is_master: true,
            retry: 3,
            t1: Duration::from_secs(1),
            t2: Duration::from_secs(1),
            t4: Duration::from_millis(10),
        };
        Circuit::new(Box::new(NullTransport), queue, pool, sink, config)
    }

    /// A retransmitted copy of the block just accumulated (sender never saw
    /// our ACK) must not be appended to the reassembly buffer a second time.
    #[test]
    fn duplicate_block_retry_is_not_appended_twice() {
        let sink = Arc::new(RecordingSink::default());
        let mut circuit = test_circuit(sink.clone());

        let first = test_block([0, 0, 0, 1], 1, false, vec![1, 2, 3]);
        circuit.accumulate(first.clone());
        assert_eq!(circuit.reassembly.len(), 1);

        circuit.accumulate(first);
        assert_eq!(circuit.reassembly.len(), 1);

        let last = test_block([0, 0, 0, 1], 2, true, vec![4, 5, 6]);
        circuit.accumulate(last);

        let primaries = sink.primaries.lock().unwrap();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].body, vec![1, 2, 3, 4, 5, 6]);
    }
}
