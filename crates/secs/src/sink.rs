use std::sync::Arc;

use secs_circuit::{CircuitDiagnostic, CircuitSink, EngineError};
use secs_hsms::{CommunicateState, HsmsError, HsmsSink};
use secs_protocol::{Block, Message};

use crate::error::CommunicatorError;
use crate::listener::Dispatcher;

/// One delivery category per §4.6 listener. SECS-I-only categories
/// (`recv_block`/`try_send_block`/`sent_block`/`circuit_error`) simply never
/// fire when the communicator is running over HSMS-SS.
#[derive(Default)]
pub struct Listeners {
    pub recv_primary: Dispatcher<Message>,
    pub recv_all: Dispatcher<Message>,
    pub sent: Dispatcher<Message>,
    pub error: Dispatcher<CommunicatorError>,
    pub communicate_state: Dispatcher<CommunicateState>,
    pub recv_block: Dispatcher<Block>,
    pub try_send_block: Dispatcher<Block>,
    pub sent_block: Dispatcher<Block>,
    pub circuit_error: Dispatcher<CircuitDiagnostic>,
}

/// Implements both backend sink traits over one shared set of listener
/// dispatchers, so `Communicator` doesn't care which backend is live.
/// Grounded on `secscommunicator.py`'s single `AbstractSecsCommunicator`
/// owning every listener category regardless of which communicator
/// subclass (SECS-I or HSMS-SS) is in play.
#[derive(Default)]
pub struct FacadeSink {
    pub listeners: Listeners,
}

impl CircuitSink for FacadeSink {
    fn on_recv_primary(&self, msg: Message) {
        self.listeners.recv_primary.publish(msg);
    }

    fn on_recv_all(&self, msg: Message) {
        self.listeners.recv_all.publish(msg);
    }

    fn on_recv_block(&self, block: &Block) {
        self.listeners.recv_block.publish(block.clone());
    }

    fn on_try_send_block(&self, block: &Block) {
        self.listeners.try_send_block.publish(block.clone());
    }

    fn on_sent_block(&self, block: &Block) {
        self.listeners.sent_block.publish(block.clone());
    }

    fn on_circuit_error(&self, diag: CircuitDiagnostic) {
        self.listeners.circuit_error.publish(diag);
    }

    fn on_error(&self, err: EngineError) {
        self.listeners.error.publish(err.into());
    }
}

impl HsmsSink for FacadeSink {
    fn on_recv_primary(&self, msg: Message) {
        self.listeners.recv_primary.publish(msg);
    }

    fn on_recv_all(&self, msg: Message) {
        self.listeners.recv_all.publish(msg);
    }

    fn on_sent(&self, msg: Message) {
        self.listeners.sent.publish(msg);
    }

    fn on_error(&self, err: HsmsError) {
        self.listeners.error.publish(err.into());
    }

    fn on_communicate_state(&self, state: CommunicateState) {
        self.listeners.communicate_state.publish(state);
    }
}

impl FacadeSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}
