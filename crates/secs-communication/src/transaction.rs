use std::sync::{Condvar, Mutex};

use secs_protocol::Message;
use secs_timing::{Deadline, Duration};

use crate::error::TransactionError;

/// Outcome of waiting for a reply: present, or "T3 elapsed with no timer
/// reset and no reply" — the façade turns the latter into a T3-Timeout error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Reply(Message),
    NoReply,
}

#[derive(Default)]
struct TransactionState {
    sent: bool,
    timer_reset: bool,
    exception: Option<TransactionError>,
    reply: Option<Message>,
}

/// One pending send, tracked from `send()` until it's been sent and (if
/// `w_bit`) replied to or timed out. Block-cursor progress during the send
/// sub-protocol lives in the circuit engine, not here — this only carries
/// the cross-thread signalling the façade's caller blocks on.
pub struct Transaction {
    pub message: Message,
    state: Mutex<TransactionState>,
    cond: Condvar,
}

impl Transaction {
    pub fn new(message: Message) -> Self {
        Self { message, state: Mutex::new(TransactionState::default()), cond: Condvar::new() }
    }

    pub fn notify_sent(&self) {
        let mut st = self.state.lock().unwrap();
        st.sent = true;
        self.cond.notify_all();
    }

    pub fn notify_reply(&self, reply: Message) {
        let mut st = self.state.lock().unwrap();
        st.reply = Some(reply);
        self.cond.notify_all();
    }

    pub fn notify_exception(&self, err: TransactionError) {
        let mut st = self.state.lock().unwrap();
        st.exception = Some(err);
        self.cond.notify_all();
    }

    /// Set when a non-final reply block arrives, so `await_reply`'s T3 wait restarts.
    pub fn notify_timer_reset(&self) {
        let mut st = self.state.lock().unwrap();
        st.timer_reset = true;
        self.cond.notify_all();
    }

    pub fn await_sent(&self, timeout: Duration) -> Result<(), TransactionError> {
        let mut st = self.state.lock().unwrap();
        let deadline = Deadline::start(timeout);
        loop {
            if let Some(err) = st.exception.clone() {
                return Err(err);
            }
            if st.sent {
                return Ok(());
            }
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Err(TransactionError::RetryOver);
            }
            let (guard, _) = self.cond.wait_timeout(st, remaining).unwrap();
            st = guard;
        }
    }

    /// Waits up to `timeout` (T3) for a reply. Each `notify_timer_reset`
    /// restarts the deadline rather than extending the remaining wait, so a
    /// stream of reply blocks arriving faster than T3 apart never times out.
    pub fn await_reply(&self, timeout: Duration) -> Result<ReplyOutcome, TransactionError> {
        let mut st = self.state.lock().unwrap();
        let mut deadline = Deadline::start(timeout);
        loop {
            if let Some(err) = st.exception.clone() {
                return Err(err);
            }
            if let Some(reply) = st.reply.clone() {
                return Ok(ReplyOutcome::Reply(reply));
            }
            if st.timer_reset {
                st.timer_reset = false;
                deadline.restart();
            }
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Ok(ReplyOutcome::NoReply);
            }
            let (guard, _) = self.cond.wait_timeout(st, remaining).unwrap();
            st = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn msg() -> Message {
        Message::new(1, 1, 1, true, [0, 0, 0, 1], vec![])
    }

    #[test]
    fn await_sent_returns_once_notified() {
        let tx = Arc::new(Transaction::new(msg()));
        let tx2 = tx.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tx2.notify_sent();
        });
        assert!(tx.await_sent(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn await_reply_restarts_on_timer_reset() {
        let tx = Arc::new(Transaction::new(msg()));
        let tx2 = tx.clone();
        thread::spawn(move || {
            for _ in 0..3 {
                thread::sleep(Duration::from_millis(30));
                tx2.notify_timer_reset();
            }
            thread::sleep(Duration::from_millis(30));
            let reply = Message::new(1, 1, 2, false, [0, 0, 0, 1], vec![9]);
            tx2.notify_reply(reply);
        });
        // total elapsed (~120ms) exceeds this T3, but no single gap does.
        let outcome = tx.await_reply(Duration::from_millis(60)).unwrap();
        assert!(matches!(outcome, ReplyOutcome::Reply(_)));
    }

    #[test]
    fn await_reply_times_out_with_no_reply() {
        let tx = Transaction::new(msg());
        let outcome = tx.await_reply(Duration::from_millis(20)).unwrap();
        assert_eq!(outcome, ReplyOutcome::NoReply);
    }

    #[test]
    fn exception_short_circuits_both_waits() {
        let tx = Transaction::new(msg());
        tx.notify_exception(TransactionError::RetryOver);
        assert_eq!(tx.await_sent(Duration::from_secs(1)), Err(TransactionError::RetryOver));
        assert_eq!(tx.await_reply(Duration::from_secs(1)), Err(TransactionError::RetryOver));
    }
}
