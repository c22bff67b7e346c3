/// Advisory circuit diagnostics (§7's `CircuitError` kind): the engine
/// resets its local state and keeps going. Delivered to `on_circuit_error`,
/// never terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDiagnostic {
    RetryCountUp { attempt: u32 },
    TimeoutT2WaitingEot,
    TimeoutT2WaitingAck,
    ReceiveNotAck,
    TimeoutT2LengthByte,
    LengthByteError { len: u8 },
    TimeoutT1,
    SumCheckError,
    DeviceIdMismatch { local: u16, received: u16 },
    TimeoutT4,
    ReceiveNotEnqOfNextBlock { byte: u8 },
}
