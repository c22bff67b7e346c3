use std::sync::{Condvar, Mutex};
use std::time::Instant;

use secs_timing::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicateState {
    NotConnect,
    Connected,
    Selected,
}

/// Thread-safe holder for the HSMS-SS communicate state. `set` reports
/// whether the state actually changed, mirroring the equality check the
/// Python original does before firing its communicate-state listeners.
pub struct CommunicateStateCell {
    state: Mutex<CommunicateState>,
    cond: Condvar,
}

impl Default for CommunicateStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicateStateCell {
    pub fn new() -> Self {
        Self { state: Mutex::new(CommunicateState::NotConnect), cond: Condvar::new() }
    }

    pub fn get(&self) -> CommunicateState {
        *self.state.lock().unwrap()
    }

    /// Returns true if this call actually changed the state.
    pub fn set(&self, new: CommunicateState) -> bool {
        let mut g = self.state.lock().unwrap();
        if *g == new {
            false
        } else {
            *g = new;
            self.cond.notify_all();
            true
        }
    }

    /// Blocks until `pred` holds or `timeout` elapses, returning the state
    /// observed at whichever came first.
    pub fn wait_for(&self, pred: impl Fn(CommunicateState) -> bool, timeout: Duration) -> CommunicateState {
        let mut g = self.state.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if pred(*g) {
                return *g;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return *g;
            }
            let (guard, _) = self.cond.wait_timeout(g, remaining).unwrap();
            g = guard;
        }
    }
}
