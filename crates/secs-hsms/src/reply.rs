use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use secs_timing::Duration;

use crate::control::REJECT_REQ;
use crate::frame::Frame;

/// What waiting on a pending request resolved to.
pub enum ReplyOutcome {
    Reply(Frame),
    Rejected,
    Closed,
    Timeout,
}

enum Settled {
    Reply(Frame),
    Rejected,
    Closed,
}

/// One outstanding request awaiting its reply, keyed by system-bytes —
/// the same role `secs_communication::Transaction` plays for SECS-I, kept
/// as its own small type here because HSMS correlates whole `Frame`s
/// (control messages included) rather than just `Message`s.
pub struct PendingReply {
    state: Mutex<Option<Settled>>,
    cond: Condvar,
}

impl PendingReply {
    fn new() -> Self {
        Self { state: Mutex::new(None), cond: Condvar::new() }
    }

    fn notify(&self, settled: Settled) {
        let mut g = self.state.lock().unwrap();
        *g = Some(settled);
        self.cond.notify_all();
    }

    pub fn wait(&self, timeout: Duration) -> ReplyOutcome {
        let mut g = self.state.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(settled) = g.take() {
                return match settled {
                    Settled::Reply(frame) => ReplyOutcome::Reply(frame),
                    Settled::Rejected => ReplyOutcome::Rejected,
                    Settled::Closed => ReplyOutcome::Closed,
                };
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ReplyOutcome::Timeout;
            }
            let (guard, _) = self.cond.wait_timeout(g, remaining).unwrap();
            g = guard;
        }
    }
}

/// Maps system-bytes to the pending request awaiting its reply (§4.5's
/// "reply matching is identical to SECS-I, by system-bytes").
#[derive(Default)]
pub struct ReplyPool {
    inner: Mutex<HashMap<[u8; 4], Arc<PendingReply>>>,
}

impl ReplyPool {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, system_bytes: [u8; 4]) -> Arc<PendingReply> {
        let pending = Arc::new(PendingReply::new());
        self.inner.lock().unwrap().insert(system_bytes, pending.clone());
        pending
    }

    pub fn unregister(&self, system_bytes: [u8; 4]) {
        self.inner.lock().unwrap().remove(&system_bytes);
    }

    /// Returns true if a pending request matched `frame`'s system-bytes. A
    /// Reject.req reply is reported as a rejection rather than a plain reply.
    pub fn notify_reply(&self, frame: &Frame) -> bool {
        let key = frame.header.system_bytes();
        if let Some(pending) = self.inner.lock().unwrap().get(&key) {
            if frame.header.s_type() == REJECT_REQ {
                pending.notify(Settled::Rejected);
            } else {
                pending.notify(Settled::Reply(frame.clone()));
            }
            true
        } else {
            false
        }
    }

    /// Wakes every pending request with a connection-closed outcome. Called
    /// once when the session tears down.
    pub fn broadcast_closed(&self) {
        for pending in self.inner.lock().unwrap().values() {
            pending.notify(Settled::Closed);
        }
    }
}
