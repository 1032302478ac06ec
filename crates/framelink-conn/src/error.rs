/// Errors that can occur in connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// The outbound queue is at capacity; the message was not accepted.
    #[error("outbound queue full")]
    QueueFull,

    /// Frames are only sent as binary transport messages.
    #[error("cannot send a {0} message; frames are binary")]
    UnsupportedMessageType(framelink_transport::MessageType),

    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// No property is stored under the key.
    #[error("no property found for key {0:?}")]
    PropertyNotFound(String),

    /// A property exists but holds a different type than requested.
    #[error("property {0:?} holds a different type")]
    PropertyTypeMismatch(String),

    /// The registry refused a new connection.
    #[error("connection limit reached (max {max})")]
    ConnectionLimit { max: usize },

    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] framelink_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framelink_transport::TransportError),
}

impl ConnError {
    /// Whether the caller may retry the operation on the same connection.
    ///
    /// A full queue drains over time; every other send failure is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull)
    }
}

pub type Result<T> = std::result::Result<T, ConnError>;
