use thiserror::Error;

/// Terminal-ish errors surfaced to `on_error`, as opposed to the advisory
/// `CircuitDiagnostic`s that the engine just logs and continues past.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("transport closed")]
    TransportClosed,
    #[error("failed to reassemble message: {0}")]
    ParseError(#[from] secs_protocol::ProtocolError),
}
