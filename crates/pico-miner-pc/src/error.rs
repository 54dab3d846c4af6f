use pico_miner_core::config::MAX_WORK_SIZE;

/// Errors raised by the simulator's host side.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// `--work` is not valid hex.
    #[error("invalid work payload: {0}")]
    WorkHex(#[from] hex::FromHexError),

    /// Work payload is empty or does not fit in one control transfer.
    #[error("work payload must be 1..={max} bytes, got {len}", max = MAX_WORK_SIZE)]
    WorkLength { len: usize },

    /// Requested multiplier outside 1..=256.
    #[error("multiplier must be 1..=256, got {0}")]
    Multiplier(u16),

    /// The device answered a descriptor request with something unusable.
    #[error("bad descriptor: {0}")]
    Descriptor(&'static str),

    /// A vendor request the device should accept was declined.
    #[error("device rejected vendor request 0x{0:02x}")]
    Rejected(u8),
}
