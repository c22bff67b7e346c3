mod config;
mod control;
mod diagnostic;
mod engine;
mod error;
mod sink;

pub use config::CircuitConfig;
pub use control::{ACK, ENQ, EOT, NAK};
pub use diagnostic::CircuitDiagnostic;
pub use engine::Circuit;
pub use error::EngineError;
pub use sink::CircuitSink;
