use std::time::Duration;

use crate::error::{ConnError, Result};

/// Default outbound queue capacity (messages).
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 1024;
/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
/// Default per-worker task queue capacity.
pub const DEFAULT_WORKER_QUEUE_CAPACITY: usize = 1024;
/// Default maximum transport message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
/// Default WebSocket upgrade timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connection configuration, read once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnConfig {
    /// Maximum number of messages waiting in the outbound queue.
    pub outbound_queue_capacity: usize,
    /// Liveness check period and idle threshold.
    pub heartbeat_interval: Duration,
    /// Number of dispatcher workers. `0` spawns one task per message.
    pub worker_pool_size: usize,
    /// Task queue capacity of each dispatcher worker.
    pub worker_queue_capacity: usize,
    /// Largest transport message accepted from a peer.
    pub max_message_size: usize,
    /// Time allowed for the WebSocket upgrade of an accepted socket.
    pub handshake_timeout: Duration,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            worker_pool_size: 0,
            worker_queue_capacity: DEFAULT_WORKER_QUEUE_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl ConnConfig {
    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enable the worker pool with `size` workers, or disable it with `0`.
    pub fn with_worker_pool(mut self, size: usize, queue_capacity: usize) -> Self {
        self.worker_pool_size = size;
        self.worker_queue_capacity = queue_capacity;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Reject values the connection cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.outbound_queue_capacity == 0 {
            return Err(ConnError::InvalidConfig(
                "outbound_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConnError::InvalidConfig(
                "heartbeat_interval must be greater than zero".to_string(),
            ));
        }
        if self.worker_pool_size > 0 && self.worker_queue_capacity == 0 {
            return Err(ConnError::InvalidConfig(
                "worker_queue_capacity must be greater than zero when the worker pool is enabled"
                    .to_string(),
            ));
        }
        if self.max_message_size < framelink_frame::HEADER_SIZE {
            return Err(ConnError::InvalidConfig(format!(
                "max_message_size must be at least {} bytes",
                framelink_frame::HEADER_SIZE
            )));
        }
        Ok(())
    }

    /// Whether requests go through a bounded worker pool.
    pub fn worker_pool_enabled(&self) -> bool {
        self.worker_pool_size > 0
    }
}

/// Connection registry configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of live connections. `0` means unlimited.
    pub max_connections: usize,
}
