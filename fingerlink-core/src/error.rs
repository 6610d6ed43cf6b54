//! Error types for fingerlink-core

/// Result type alias for fingerlink-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Frame-level protocol errors
///
/// Every variant means the bytes on the wire could not be trusted as a
/// sensor frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Frame is too short to be valid
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// Frame does not start with the 0xEF01 sync header
    #[error("Bad frame header: 0x{0:04X}")]
    BadHeader(u16),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Unknown packet identifier
    #[error("Unknown packet identifier: 0x{0:02X}")]
    UnknownPacketKind(u8),

    /// Length field outside what the sensor can send
    #[error("Invalid length field: {0}")]
    InvalidLength(u16),

    /// Payload too large
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Response frame carried no confirmation code
    #[error("Acknowledge frame has an empty payload")]
    EmptyAcknowledge,

    /// Response came from a different module address
    #[error("Address mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    AddressMismatch {
        expected: u32,
        actual: u32,
    },

    /// Frame is not an acknowledge packet
    #[error("Unexpected packet kind: {0:?}")]
    UnexpectedPacket(crate::packet::PacketKind),

    /// Unknown instruction code
    #[error("Unknown instruction code: 0x{0:02X}")]
    UnknownInstruction(u8),

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Response payload shorter than the instruction requires
    #[error("Short response payload: expected {expected} bytes, got {actual} bytes")]
    ShortPayload {
        expected: usize,
        actual: usize,
    },
}

impl Error {
    /// Check if the error came from damaged bytes rather than a wrong peer
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::BadHeader(_)
                | Self::ChecksumMismatch { .. }
                | Self::InvalidLength(_)
                | Self::UnknownPacketKind(_)
        )
    }
}
