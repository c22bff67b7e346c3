/// Parses SML (SECS Message Language) text into the `(stream, function,
/// w_bit, body)` tuple `send_sml`/`reply_sml` need. SML text parsing itself
/// is out of scope here — this trait is the seam a caller plugs a real
/// parser into, matching `send_sml`/`reply_sml` in `secscommunicator.py`
/// which likewise just delegates to an external SML compiler.
pub trait SmlParser: Send + Sync {
    fn parse(&self, sml: &str) -> Result<(u8, u8, bool, Vec<u8>), String>;
}
