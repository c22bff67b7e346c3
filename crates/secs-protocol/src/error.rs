use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("block length byte {0} out of range 10..=254")]
    LengthByteError(u8),
    #[error("block length byte {len} inconsistent with {actual} bytes read")]
    LengthMismatch { len: u8, actual: usize },
    #[error("block checksum mismatch")]
    SumCheckError,
    #[error("device-id mismatch: local {local}, received {received}")]
    DeviceIdMismatch { local: u16, received: u16 },
    #[error("message body requires more than 32767 blocks")]
    TooManyBlocks,
    #[error("cannot reassemble an empty block list")]
    EmptyReassembly,
}
