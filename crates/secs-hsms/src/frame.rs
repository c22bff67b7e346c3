use secs_protocol::{HEADER_LEN, Header, Message};

/// One HSMS-SS wire frame: 4-byte big-endian length, 10-byte header, body.
/// Unlike a SECS-I block, there's no 244-byte cap and no checksum — TCP
/// already guarantees byte-exact, in-order delivery.
#[derive(Clone, Debug)]
pub struct Frame {
    pub header: Header,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        let len = (HEADER_LEN + self.body.len()) as u32;
        let mut out = Vec::with_capacity(4 + HEADER_LEN + self.body.len());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.header.0);
        out.extend_from_slice(&self.body);
        out
    }

    pub fn data_message(msg: &Message) -> Self {
        Self { header: Header::for_hsms(msg.device_id, msg.stream, msg.w_bit, msg.function, 0, 0, msg.system_bytes), body: msg.body.clone() }
    }

    /// Builds a control-message frame. `status` occupies the header's
    /// function byte slot, which is where SEMI E37 puts the status/reason
    /// code on a Select.rsp, Deselect.rsp, or Reject.req — request-side
    /// control messages just pass 0.
    pub fn control(device_id: u16, s_type: u8, status: u8, system_bytes: [u8; 4], body: Vec<u8>) -> Self {
        Self { header: Header::for_hsms(device_id, 0, false, status, 0, s_type, system_bytes), body }
    }

    pub fn to_message(&self) -> Message {
        Message::new(
            self.header.device_id(),
            self.header.stream(),
            self.header.function(),
            self.header.w_bit(),
            self.header.system_bytes(),
            self.body.clone(),
        )
    }
}
