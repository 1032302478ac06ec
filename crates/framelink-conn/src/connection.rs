//! The per-connection actor.
//!
//! A [`Connection`] owns one message socket and runs three tasks while it is
//! live:
//! - the read pump decodes inbound frames and hands them to the dispatcher,
//! - the write pump drains the outbound queue onto the socket,
//! - the heartbeat monitor closes the connection after an idle interval.
//!
//! Every failure path ends in [`Connection::close`], which is idempotent:
//! the first caller fires the close signal and deregisters the connection,
//! later callers return immediately.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use framelink_frame::{decode_message, encode_into, Message};
use framelink_transport::{MessageSink, MessageSocket, MessageSource, MessageType, RawMessage};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ConnConfig;
use crate::dispatch::{Dispatch, Request};
use crate::error::{ConnError, Result};
use crate::heartbeat::Heartbeat;
use crate::property::{PropertyStore, PropertyValue};
use crate::queue::OutboundQueue;
use crate::registry::Registry;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const SINK_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered; pumps may be running.
    Running,
    /// Close signal fired; pumps are still winding down.
    Closing,
    /// Close signal fired and no pump is left.
    Closed,
}

struct Shared {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    queue: OutboundQueue,
    heartbeat: Heartbeat,
    properties: PropertyStore,
    closed: Mutex<bool>,
    close_signal: CancellationToken,
    active_tasks: AtomicUsize,
    registry: Arc<dyn Registry>,
    dispatcher: Arc<dyn Dispatch>,
}

/// Handle to a live (or closed) connection. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

/// A registered connection whose pumps have not been started yet.
///
/// Messages sent through [`PendingConnection::connection`] wait in the
/// outbound queue until [`PendingConnection::start`] is called. Dropping it
/// without starting leaves the connection registered until `close` is called
/// on the handle.
pub struct PendingConnection<S> {
    connection: Connection,
    socket: S,
    outbound: mpsc::Receiver<Message>,
}

impl Connection {
    /// Wrap an accepted socket and register it with `registry`.
    ///
    /// The connection is `Running` once this returns; call
    /// [`PendingConnection::start`] to begin moving data.
    pub fn new<S: MessageSocket>(
        socket: S,
        config: &ConnConfig,
        registry: Arc<dyn Registry>,
        dispatcher: Arc<dyn Dispatch>,
    ) -> Result<PendingConnection<S>> {
        config.validate()?;

        let close_signal = CancellationToken::new();
        let (queue, outbound) =
            OutboundQueue::bounded(config.outbound_queue_capacity, close_signal.clone());

        let connection = Connection {
            shared: Arc::new(Shared {
                id: ConnectionId::next(),
                remote_addr: socket.remote_addr(),
                queue,
                heartbeat: Heartbeat::new(config.heartbeat_interval),
                properties: PropertyStore::new(),
                closed: Mutex::new(false),
                close_signal,
                active_tasks: AtomicUsize::new(0),
                registry,
                dispatcher,
            }),
        };

        connection.shared.registry.add(&connection);
        info!(
            conn_id = %connection.id(),
            remote_addr = ?connection.remote_addr(),
            "connection opened"
        );

        Ok(PendingConnection {
            connection,
            socket,
            outbound,
        })
    }

    /// Process-unique id.
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Address of the remote peer, when the transport has one.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.shared.remote_addr
    }

    /// Queue a message for delivery without waiting.
    ///
    /// Fails with [`ConnError::QueueFull`](crate::ConnError::QueueFull) when
    /// the outbound queue is at capacity and with
    /// [`ConnError::ConnectionClosed`](crate::ConnError::ConnectionClosed)
    /// once the connection has closed. Frames only travel as binary
    /// transport messages; any other `msg_type` is rejected with
    /// [`ConnError::UnsupportedMessageType`](crate::ConnError::UnsupportedMessageType)
    /// and nothing is queued.
    pub fn send(
        &self,
        msg_type: MessageType,
        protocol_id: u32,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        if msg_type != MessageType::Binary {
            return Err(ConnError::UnsupportedMessageType(msg_type));
        }
        self.shared
            .queue
            .enqueue(Message::new(msg_type, protocol_id, payload))
    }

    /// Queue a binary message.
    pub fn send_binary(&self, protocol_id: u32, payload: impl Into<Bytes>) -> Result<()> {
        self.send(MessageType::Binary, protocol_id, payload)
    }

    /// Store a property on this connection.
    pub fn set_property<V>(&self, key: impl Into<String>, value: V)
    where
        V: Any + Send + Sync,
    {
        self.shared.properties.set(key, value);
    }

    /// Fetch a property.
    pub fn get_property(&self, key: &str) -> Result<PropertyValue> {
        self.shared.properties.get(key)
    }

    /// Fetch a property as a concrete type.
    pub fn get_property_as<T>(&self, key: &str) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.shared.properties.get_as(key)
    }

    /// Remove a property.
    pub fn remove_property(&self, key: &str) -> Option<PropertyValue> {
        self.shared.properties.remove(key)
    }

    /// The property store itself.
    pub fn properties(&self) -> &PropertyStore {
        &self.shared.properties
    }

    /// Close the connection.
    ///
    /// Only the first call has an effect: it fires the close signal, which
    /// stops the pumps and releases the socket, and deregisters the
    /// connection. Queued messages are abandoned.
    pub fn close(&self) {
        {
            let mut closed = self.shared.closed.lock();
            if *closed {
                return;
            }
            *closed = true;
            self.shared.close_signal.cancel();
        }

        self.shared.registry.remove(self);
        info!(
            conn_id = %self.id(),
            abandoned = self.shared.queue.len(),
            "connection closed"
        );
    }

    /// Whether the close signal has fired.
    pub fn is_closed(&self) -> bool {
        self.shared.close_signal.is_cancelled()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        if !self.is_closed() {
            ConnectionState::Running
        } else if self.shared.active_tasks.load(Ordering::Acquire) > 0 {
            ConnectionState::Closing
        } else {
            ConnectionState::Closed
        }
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        self.shared.close_signal.cancelled().await;
    }

    /// Time since the last frame was read or written.
    pub fn idle_for(&self) -> Duration {
        self.shared.heartbeat.idle_for()
    }

    /// Messages waiting in the outbound queue.
    pub fn pending_outbound(&self) -> usize {
        self.shared.queue.len()
    }

    fn spawn_task<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.shared.active_tasks.fetch_add(1, Ordering::AcqRel);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            task.await;
            shared.active_tasks.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("remote_addr", &self.shared.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}

impl<S: MessageSocket> PendingConnection<S> {
    /// The connection handle.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Spawn the read pump, write pump and heartbeat monitor.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> Connection {
        let Self {
            connection,
            socket,
            outbound,
        } = self;
        let (sink, source) = socket.split();

        connection.spawn_task(read_pump(connection.clone(), source));
        connection.spawn_task(write_pump(connection.clone(), sink, outbound));
        connection.spawn_task(heartbeat_monitor(connection.clone()));
        debug!(conn_id = %connection.id(), "connection started");

        connection
    }
}

async fn read_pump<R: MessageSource>(conn: Connection, mut source: R) {
    let closed = conn.shared.close_signal.clone();
    loop {
        let received = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            received = source.recv() => received,
        };

        let raw = match received {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(conn_id = %conn.id(), "peer closed connection");
                break;
            }
            Err(err) => {
                debug!(conn_id = %conn.id(), error = %err, "read failed");
                break;
            }
        };

        let message = match decode_message(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(conn_id = %conn.id(), error = %err, "malformed frame; closing connection");
                break;
            }
        };

        conn.shared.heartbeat.touch();
        trace!(
            conn_id = %conn.id(),
            protocol_id = message.protocol_id(),
            len = message.payload().len(),
            "frame received"
        );
        conn.shared
            .dispatcher
            .dispatch(Request::new(conn.clone(), message));
    }

    conn.close();
    debug!(conn_id = %conn.id(), "read pump stopped");
}

async fn write_pump<W: MessageSink>(
    conn: Connection,
    mut sink: W,
    mut outbound: mpsc::Receiver<Message>,
) {
    let closed = conn.shared.close_signal.clone();
    let mut buf = BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY);

    loop {
        let message = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        if let Err(err) = encode_into(message.protocol_id(), message.payload(), &mut buf) {
            warn!(conn_id = %conn.id(), error = %err, "cannot encode outbound frame");
            conn.close();
            break;
        }
        let raw = RawMessage {
            kind: message.msg_type(),
            data: buf.split().freeze(),
        };

        let written = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            written = sink.send(raw) => written,
        };

        match written {
            Ok(()) => {
                conn.shared.heartbeat.touch();
                trace!(
                    conn_id = %conn.id(),
                    protocol_id = message.protocol_id(),
                    len = message.payload().len(),
                    "frame written"
                );
            }
            Err(err) => {
                debug!(conn_id = %conn.id(), error = %err, "write failed");
                conn.close();
                break;
            }
        }
    }

    drop(outbound);
    // Only the transport's Close control frame goes out after this point.
    match tokio::time::timeout(SINK_CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(conn_id = %conn.id(), error = %err, "socket close failed"),
        Err(_) => debug!(conn_id = %conn.id(), "socket close timed out"),
    }
    debug!(conn_id = %conn.id(), "write pump stopped");
}

async fn heartbeat_monitor(conn: Connection) {
    let closed = conn.shared.close_signal.clone();
    let interval = conn.shared.heartbeat.interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            _ = ticker.tick() => {
                if conn.shared.heartbeat.is_expired() {
                    info!(
                        conn_id = %conn.id(),
                        idle_ms = conn.idle_for().as_millis() as u64,
                        "heartbeat timeout; closing connection"
                    );
                    conn.close();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_unique_and_increasing() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(b.to_string(), b.as_u64().to_string());
    }
}
