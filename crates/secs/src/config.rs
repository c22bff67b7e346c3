use secs_timing::Duration;

use crate::error::UsageError;

/// Selects the backend and link parameters a `Communicator` drives.
/// SECS-I has only one role (master/slave, set on `CommunicatorConfig`);
/// HSMS-SS splits into an active (client, dials out and sends Select.req)
/// and passive (server, accepts and auto-answers an inbound Select.req) role,
/// matching `secs1ontcpipcommunicator.py` vs `hsmssscommunicator.py`'s
/// active/passive split in the original source.
#[derive(Clone, Debug)]
pub enum CommunicatorKind {
    Secs1 { path: String, baud: u32 },
    HsmsActive { addr: String },
    HsmsPassive { bind_addr: String },
}

/// Plain keyword-args-style configuration — the source system takes these
/// as constructor arguments, not a config file. Field set and defaults
/// mirror `AbstractSecsCommunicator`'s `timeout_t1..t8`/`retry` properties
/// in `secscommunicator.py`.
#[derive(Clone, Debug)]
pub struct CommunicatorConfig {
    pub device_id: u16,
    pub is_equip: bool,
    /// SECS-I only: master initiates sends, slave yields to a contending ENQ.
    pub is_master: bool,
    pub retry: u32,
    pub timeout_t1: Duration,
    pub timeout_t2: Duration,
    pub timeout_t3: Duration,
    pub timeout_t4: Duration,
    /// Validated and stored for API parity with the original; not consulted
    /// by the circuit or HSMS session engines themselves (no GEM layer here).
    pub timeout_t5: Duration,
    pub timeout_t6: Duration,
    pub timeout_t7: Duration,
    pub timeout_t8: Duration,
    /// TCP client reconnect pacing (HSMS active/client role only).
    pub reconnect: Duration,
    /// TCP server rebind pacing (HSMS passive/server role only).
    pub rebind: Duration,
    pub name: Option<String>,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            is_equip: false,
            is_master: true,
            retry: 3,
            timeout_t1: Duration::from_secs(1),
            timeout_t2: Duration::from_secs(15),
            timeout_t3: Duration::from_secs(45),
            timeout_t4: Duration::from_secs(45),
            timeout_t5: Duration::from_secs(10),
            timeout_t6: Duration::from_secs(5),
            timeout_t7: Duration::from_secs(10),
            timeout_t8: Duration::from_secs(5),
            reconnect: Duration::from_secs(5),
            rebind: Duration::from_secs(5),
            name: None,
        }
    }
}

impl CommunicatorConfig {
    /// Checked once at `open()`, rather than per-field on every setter as
    /// the Python property setters do — this is a plain struct, not a
    /// collection of properties.
    pub fn validate(&self) -> Result<(), UsageError> {
        if self.device_id > 0x7fff {
            return Err(UsageError::InvalidDeviceId(self.device_id));
        }
        for (name, t) in [
            ("t1", self.timeout_t1),
            ("t2", self.timeout_t2),
            ("t3", self.timeout_t3),
            ("t4", self.timeout_t4),
            ("t5", self.timeout_t5),
            ("t6", self.timeout_t6),
            ("t7", self.timeout_t7),
            ("t8", self.timeout_t8),
        ] {
            if t.is_zero() {
                return Err(UsageError::InvalidTimeout(name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(CommunicatorConfig::default().validate().is_ok());
    }

    #[test]
    fn device_id_out_of_range_is_rejected() {
        let mut config = CommunicatorConfig::default();
        config.device_id = 0x8000;
        assert_eq!(config.validate(), Err(UsageError::InvalidDeviceId(0x8000)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = CommunicatorConfig::default();
        config.timeout_t3 = Duration::ZERO;
        assert_eq!(config.validate(), Err(UsageError::InvalidTimeout("t3")));
    }
}
