mod error;
mod pool;
mod queue;
mod transaction;

pub use error::{PoolError, TransactionError};
pub use pool::SendReplyPool;
pub use queue::{ByteMessageQueue, Polled};
pub use transaction::{ReplyOutcome, Transaction};
