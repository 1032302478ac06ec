use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::Result;

/// Transport-level frame type marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Binary data message. The only type the connection layer accepts.
    Binary,
    /// UTF-8 text message.
    Text,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => f.write_str("binary"),
            Self::Text => f.write_str("text"),
        }
    }
}

/// One complete logical message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Transport frame type.
    pub kind: MessageType,
    /// Message bytes.
    pub data: Bytes,
}

impl RawMessage {
    /// Create a binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Binary,
            data: data.into(),
        }
    }

    /// Create a text message.
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Text,
            data: data.into(),
        }
    }
}

/// Read half of a message socket.
pub trait MessageSource: Send + 'static {
    /// Receive the next complete message.
    ///
    /// Returns `Ok(None)` on orderly EOF or when the peer closed the socket.
    fn recv(&mut self) -> impl Future<Output = Result<Option<RawMessage>>> + Send;
}

/// Write half of a message socket.
pub trait MessageSink: Send + 'static {
    /// Send one complete message.
    fn send(&mut self, message: RawMessage) -> impl Future<Output = Result<()>> + Send;

    /// Close the write direction and release the underlying socket.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// A connected, message-oriented socket that can be split into halves.
pub trait MessageSocket: Send + 'static {
    /// Read half.
    type Source: MessageSource;
    /// Write half.
    type Sink: MessageSink;

    /// Address of the remote peer, when the transport has one.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Split into independently owned write and read halves.
    fn split(self) -> (Self::Sink, Self::Source);
}
