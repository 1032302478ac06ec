//! Length-prefixed binary messaging over WebSocket.
//!
//! framelink turns each accepted WebSocket into a connection actor that
//! decodes `[total_len][protocol_id][payload]` frames, dispatches them to an
//! application handler, and delivers outbound messages through a bounded,
//! non-blocking queue. Idle connections are closed by a heartbeat monitor.
//!
//! # Crate Structure
//!
//! - [`transport`]: message socket abstraction (WebSocket, in-memory pairs)
//! - [`frame`]: the 8-byte header codec
//! - [`conn`]: connection actor, dispatch strategies, registry and listener

/// Re-export transport types.
pub mod transport {
    pub use framelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framelink_frame::*;
}

/// Re-export connection types.
pub mod conn {
    pub use framelink_conn::*;
}
