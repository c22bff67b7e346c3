mod block;
mod error;
mod header;
mod message;
mod system_bytes;

pub use block::{Block, MAX_BLOCK_BODY};
pub use error::ProtocolError;
pub use header::{HEADER_LEN, Header};
pub use message::Message;
pub use system_bytes::SystemBytesGenerator;
