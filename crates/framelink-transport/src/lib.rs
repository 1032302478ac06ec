//! Message-oriented socket abstraction.
//!
//! Provides a unified interface over transports that deliver one complete
//! logical message per read:
//! - WebSocket streams (via `tokio-tungstenite`)
//! - In-memory socket pairs (tests, embedding)
//!
//! This is the lowest layer of framelink. Everything else builds on top of
//! the [`MessageSocket`] trait provided here.

pub mod error;
pub mod memory;
pub mod traits;
pub mod ws;

pub use error::{Result, TransportError};
pub use memory::{pair, MemorySink, MemorySocket, MemorySource};
pub use traits::{MessageSink, MessageSocket, MessageSource, MessageType, RawMessage};
pub use ws::{WsSink, WsSocket, WsSource};
