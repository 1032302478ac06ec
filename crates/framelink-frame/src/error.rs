use framelink_transport::MessageType;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// The input is shorter than the fixed header.
    #[error("malformed frame: {len} bytes is shorter than the 8-byte header")]
    Truncated { len: usize },

    /// The declared total length disagrees with the received byte count.
    #[error("malformed frame: declared length {declared} but received {actual} bytes")]
    LengthMismatch { declared: u32, actual: usize },

    /// The transport delivered something other than a binary message.
    #[error("malformed frame: expected a binary message, got {0}")]
    UnexpectedType(MessageType),

    /// The payload cannot be described by the 32-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// Whether this error means the peer violated the framing contract.
    ///
    /// Malformed frames are always fatal to the connection.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::LengthMismatch { .. } | Self::UnexpectedType(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
