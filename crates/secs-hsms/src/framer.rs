use secs_protocol::{HEADER_LEN, Header};
use secs_timing::{Deadline, Duration};
use secs_transport::Transport;

use crate::error::HsmsError;
use crate::frame::Frame;

/// No real deadline applies while waiting for the next frame to start.
const NO_DEADLINE: Duration = Duration::from_secs(365 * 24 * 3600);
/// Read granularity while waiting, so a stop flag can be re-checked promptly.
const POLL_TICK: Duration = Duration::from_millis(200);

/// Reads one complete frame. The first byte of the 4-byte length prefix can
/// arrive at any time (no inter-message timeout); every byte after that —
/// through the rest of the length, the header, and the body — must arrive
/// within `t8` of the previous one.
pub fn read_frame(
    transport: &mut dyn Transport,
    t8: Duration,
    should_stop: &dyn Fn() -> bool,
) -> Result<Frame, HsmsError> {
    let mut len_buf = [0u8; 4];
    read_bounded(transport, &mut len_buf[..1], NO_DEADLINE, should_stop)?;
    read_bounded(transport, &mut len_buf[1..], t8, should_stop)?;
    let len = u32::from_be_bytes(len_buf);
    if len < HEADER_LEN as u32 {
        return Err(HsmsError::Framing);
    }
    let mut rest = vec![0u8; len as usize];
    read_bounded(transport, &mut rest, t8, should_stop)?;
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&rest[..HEADER_LEN]);
    Ok(Frame { header: Header::from_bytes(header), body: rest[HEADER_LEN..].to_vec() })
}

fn read_bounded(
    transport: &mut dyn Transport,
    buf: &mut [u8],
    timeout: Duration,
    should_stop: &dyn Fn() -> bool,
) -> Result<(), HsmsError> {
    let mut filled = 0;
    let mut deadline = Deadline::start(timeout);
    while filled < buf.len() {
        if should_stop() {
            return Err(HsmsError::Closed);
        }
        transport.set_read_timeout(POLL_TICK.min(timeout)).map_err(|_| HsmsError::Closed)?;
        match transport.read(&mut buf[filled..]) {
            Ok(0) => {
                if deadline.expired() {
                    return Err(HsmsError::TimeoutT8);
                }
            }
            Ok(n) => {
                filled += n;
                deadline.restart();
            }
            Err(_) => return Err(HsmsError::Closed),
        }
    }
    Ok(())
}
