//! Per-connection transport core.
//!
//! Each accepted socket becomes a [`Connection`]: a read pump that decodes
//! frames and dispatches them, a write pump that drains a bounded outbound
//! queue, and a heartbeat monitor that closes idle connections. All three
//! converge on one idempotent close.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod listener;
pub mod property;
pub mod queue;
pub mod registry;

pub use config::{ConnConfig, RegistryConfig};
pub use connection::{Connection, ConnectionId, ConnectionState, PendingConnection};
pub use dispatch::{
    dispatcher, handler_fn, Dispatch, Handler, HandlerFn, Request, SpawnPerMessage, WorkerPool,
};
pub use error::{ConnError, Result};
pub use heartbeat::Heartbeat;
pub use listener::WsListener;
pub use property::{PropertyStore, PropertyValue};
pub use queue::OutboundQueue;
pub use registry::{BroadcastReport, ConnectionRegistry, Registry, Reservation};
