use bytes::Bytes;
use framelink_transport::MessageType;

/// A decoded unit of application traffic. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    msg_type: MessageType,
    protocol_id: u32,
    payload: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(msg_type: MessageType, protocol_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            protocol_id,
            payload: payload.into(),
        }
    }

    /// Create a binary message.
    pub fn binary(protocol_id: u32, payload: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Binary, protocol_id, payload)
    }

    /// Transport frame type this message travels as.
    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    /// Protocol/message identifier.
    pub fn protocol_id(&self) -> u32 {
        self.protocol_id
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The total wire size of this message once framed.
    pub fn wire_size(&self) -> usize {
        crate::HEADER_SIZE + self.payload.len()
    }
}
