use secs_protocol::{Block, Message};

use crate::diagnostic::CircuitDiagnostic;
use crate::error::EngineError;

/// Everything the circuit engine reports upward, implemented by the façade
/// to fan out into per-category listener delivery workers. Ordering
/// requirement: for one transaction, `on_try_send_block` precedes the
/// matching `on_sent_block`.
pub trait CircuitSink: Send + Sync {
    fn on_recv_primary(&self, msg: Message);
    fn on_recv_all(&self, msg: Message);
    fn on_recv_block(&self, block: &Block);
    fn on_try_send_block(&self, block: &Block);
    fn on_sent_block(&self, block: &Block);
    fn on_circuit_error(&self, diag: CircuitDiagnostic);
    fn on_error(&self, err: EngineError);
}
