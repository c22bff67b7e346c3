mod control;
mod error;
mod frame;
mod framer;
mod reply;
mod session;
mod state;

pub use control::{
    DESELECT_REQ, DESELECT_RSP, LINKTEST_REQ, LINKTEST_RSP, REJECT_REQ, SELECT_REQ, SELECT_RSP, SEPARATE_REQ,
};
pub use error::HsmsError;
pub use frame::Frame;
pub use framer::read_frame;
pub use reply::{PendingReply, ReplyOutcome, ReplyPool};
pub use session::{HsmsConfig, HsmsSession, HsmsSink};
pub use state::{CommunicateState, CommunicateStateCell};
