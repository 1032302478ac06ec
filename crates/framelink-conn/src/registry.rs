use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use framelink_transport::MessageType;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::ConnError;

/// Tracks live connections.
///
/// A connection calls `add` once when constructed and `remove` once when it
/// closes.
pub trait Registry: Send + Sync + 'static {
    /// Start tracking `connection`.
    fn add(&self, connection: &Connection);

    /// Stop tracking `connection`.
    fn remove(&self, connection: &Connection);
}

/// Outcome of a [`ConnectionRegistry::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that accepted the message into their outbound queue.
    pub queued: usize,
    /// Connections whose outbound queue was full.
    pub dropped_full: usize,
    /// Connections that closed before the message could be queued.
    pub dropped_closed: usize,
}

/// In-memory registry of live connections with lookup and broadcast.
///
/// `max_connections` is enforced through [`ConnectionRegistry::try_reserve`]:
/// a slot is taken before the WebSocket upgrade and held until the
/// connection is registered or the upgrade is abandoned.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    config: RegistryConfig,
    // Registered connections plus outstanding reservations.
    occupied: AtomicUsize,
    total_added: AtomicU64,
    total_removed: AtomicU64,
}

impl ConnectionRegistry {
    /// Create a registry.
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            config,
            occupied: AtomicUsize::new(0),
            total_added: AtomicU64::new(0),
            total_removed: AtomicU64::new(0),
        })
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Look up a live connection.
    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ids of all live connections, ascending.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Connections ever added.
    pub fn total_added(&self) -> u64 {
        self.total_added.load(Ordering::Relaxed)
    }

    /// Connections ever removed.
    pub fn total_removed(&self) -> u64 {
        self.total_removed.load(Ordering::Relaxed)
    }

    /// Whether every slot is taken by a live connection or a reservation.
    pub fn is_full(&self) -> bool {
        self.config.max_connections > 0
            && self.occupied.load(Ordering::Acquire) >= self.config.max_connections
    }

    /// Take a connection slot, failing with [`ConnError::ConnectionLimit`]
    /// when none is left.
    ///
    /// Check and increment happen in one atomic step, so concurrent callers
    /// never exceed `max_connections`. The slot is returned when the
    /// [`Reservation`] is dropped; register the connection before dropping
    /// it.
    pub fn try_reserve(self: &Arc<Self>) -> crate::Result<Reservation> {
        let max = self.config.max_connections;
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |occupied| {
                (max == 0 || occupied < max).then_some(occupied + 1)
            })
            .map_err(|_| ConnError::ConnectionLimit { max })?;
        Ok(Reservation {
            registry: Arc::clone(self),
        })
    }

    /// Queue the same binary message on every live connection.
    pub fn broadcast(&self, protocol_id: u32, payload: impl Into<Bytes>) -> BroadcastReport {
        let payload = payload.into();
        let mut report = BroadcastReport::default();
        for connection in self.snapshot() {
            match connection.send(MessageType::Binary, protocol_id, payload.clone()) {
                Ok(()) => report.queued += 1,
                Err(ConnError::QueueFull) => report.dropped_full += 1,
                Err(_) => report.dropped_closed += 1,
            }
        }
        debug!(protocol_id, ?report, "broadcast queued");
        report
    }

    /// Close every live connection.
    pub fn close_all(&self) {
        let connections = self.snapshot();
        info!(count = connections.len(), "closing all connections");
        for connection in connections {
            connection.close();
        }
    }

    // Closing deregisters, so callers must not hold a map guard while
    // touching connections.
    fn snapshot(&self) -> Vec<Connection> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl Registry for ConnectionRegistry {
    fn add(&self, connection: &Connection) {
        if self
            .connections
            .insert(connection.id(), connection.clone())
            .is_none()
        {
            self.occupied.fetch_add(1, Ordering::AcqRel);
            self.total_added.fetch_add(1, Ordering::Relaxed);
        }
        debug!(conn_id = %connection.id(), live = self.len(), "connection registered");
    }

    fn remove(&self, connection: &Connection) {
        if self.connections.remove(&connection.id()).is_some() {
            self.occupied.fetch_sub(1, Ordering::AcqRel);
            self.total_removed.fetch_add(1, Ordering::Relaxed);
        }
        debug!(conn_id = %connection.id(), live = self.len(), "connection deregistered");
    }
}

/// A connection slot held between accept and registration.
#[must_use = "the slot is released as soon as the reservation is dropped"]
pub struct Reservation {
    registry: Arc<ConnectionRegistry>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.registry.occupied.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("live", &self.len())
            .field("occupied", &self.occupied.load(Ordering::Relaxed))
            .field("config", &self.config)
            .finish()
    }
}
