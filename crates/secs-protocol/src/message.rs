use crate::block::{Block, MAX_BLOCK_BODY};
use crate::error::ProtocolError;
use crate::header::Header;

/// A SECS message. The body is carried pre-encoded (SECS-II item-tree
/// construction and decoding is an external collaborator's job — see
/// `secs-protocol`'s crate docs); this type only needs enough of the body to
/// split it across blocks and glue it back together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub device_id: u16,
    pub stream: u8,
    pub function: u8,
    pub w_bit: bool,
    pub system_bytes: [u8; 4],
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(
        device_id: u16,
        stream: u8,
        function: u8,
        w_bit: bool,
        system_bytes: [u8; 4],
        body: Vec<u8>,
    ) -> Self {
        Self { device_id, stream, function, w_bit, system_bytes, body }
    }

    /// Split into SECS-I blocks of at most 244 body bytes, numbered from 1,
    /// with the E-bit set only on the last block. A body-less message still
    /// yields exactly one (empty) block.
    pub fn into_blocks(&self) -> Result<Vec<Block>, ProtocolError> {
        let chunks: Vec<&[u8]> =
            if self.body.is_empty() { vec![&[][..]] } else { self.body.chunks(MAX_BLOCK_BODY).collect() };
        if chunks.len() > 32767 {
            return Err(ProtocolError::TooManyBlocks);
        }
        let total = chunks.len();
        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let block_number = (i + 1) as u16;
                let e_bit = i + 1 == total;
                let header = Header::for_secs1_block(
                    self.device_id,
                    false,
                    self.stream,
                    self.w_bit,
                    self.function,
                    block_number,
                    e_bit,
                    self.system_bytes,
                );
                Block { header, body: chunk.to_vec() }
            })
            .collect())
    }

    /// Reassemble a message from an ordered, already-validated block list
    /// (see `secs-circuit`'s reassembly buffer for the ordering/dedup rules).
    pub fn from_blocks(blocks: &[Block]) -> Result<Self, ProtocolError> {
        let first = blocks.first().ok_or(ProtocolError::EmptyReassembly)?;
        let mut body = Vec::with_capacity(blocks.iter().map(|b| b.body.len()).sum());
        for b in blocks {
            body.extend_from_slice(&b.body);
        }
        Ok(Self {
            device_id: first.header.device_id(),
            stream: first.header.stream(),
            function: first.header.function(),
            w_bit: first.header.w_bit(),
            system_bytes: first.header.system_bytes(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_block_round_trip() {
        let msg = Message::new(17, 1, 1, true, [0xAA, 0xBB, 0xCC, 0xDD], vec![]);
        let blocks = msg.into_blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].header.e_bit());
        assert_eq!(blocks[0].header.block_number(), 1);
        let back = Message::from_blocks(&blocks).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn two_block_message_splits_244_then_remainder() {
        let body = vec![7u8; 300];
        let msg = Message::new(1, 18, 5, false, [0, 0, 0, 1], body.clone());
        let blocks = msg.into_blocks().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].body.len(), 244);
        assert_eq!(blocks[1].body.len(), 56);
        assert!(!blocks[0].header.e_bit());
        assert!(blocks[1].header.e_bit());
        assert_eq!(blocks[0].header.block_number(), 1);
        assert_eq!(blocks[1].header.block_number(), 2);
        let back = Message::from_blocks(&blocks).unwrap();
        assert_eq!(back.body, body);
    }

    #[test]
    fn large_body_round_trips_block_by_block() {
        let body: Vec<u8> = (0..7995).map(|i| (i % 256) as u8).collect();
        let msg = Message::new(3, 6, 11, true, [1, 2, 3, 4], body.clone());
        let blocks = msg.into_blocks().unwrap();
        assert!(blocks.len() > 1);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.header.block_number() as usize, i + 1);
            assert_eq!(block.header.e_bit(), i + 1 == blocks.len());
        }
        let back = Message::from_blocks(&blocks).unwrap();
        assert_eq!(back.body, body);
    }
}
