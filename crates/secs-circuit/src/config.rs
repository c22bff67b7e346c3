use secs_timing::Duration;

/// Circuit-engine-relevant configuration. The full `timeout_t1..t8`/`retry`
/// surface lives on the façade's `CommunicatorConfig`; this is the subset
/// the SECS-I circuit actually consults (T3 is awaited by the caller via
/// `Transaction::await_reply`, not inside the circuit loop).
#[derive(Clone, Copy, Debug)]
pub struct CircuitConfig {
    pub device_id: u16,
    pub is_master: bool,
    pub retry: u32,
    pub t1: Duration,
    pub t2: Duration,
    pub t4: Duration,
}
