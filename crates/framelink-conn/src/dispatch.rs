//! Hand-off of decoded requests to application handlers.
//!
//! The connection only sees [`Dispatch`]. Whether a request runs on a fresh
//! task or waits in a bounded worker queue is decided once, when the
//! dispatcher is built from configuration.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use framelink_frame::Message;
use futures_util::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use crate::config::ConnConfig;
use crate::connection::Connection;
use crate::error::Result;

/// A decoded message paired with the connection it arrived on.
#[derive(Debug, Clone)]
pub struct Request {
    connection: Connection,
    message: Message,
}

impl Request {
    /// Pair a message with its connection.
    pub fn new(connection: Connection, message: Message) -> Self {
        Self {
            connection,
            message,
        }
    }

    /// The connection the message arrived on.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The decoded message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Protocol id of the message.
    pub fn protocol_id(&self) -> u32 {
        self.message.protocol_id()
    }

    /// Payload of the message.
    pub fn payload(&self) -> &Bytes {
        self.message.payload()
    }

    /// Queue a binary response on the same protocol id.
    pub fn reply(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.connection.send_binary(self.protocol_id(), payload)
    }

    /// Split into connection and message.
    pub fn into_parts(self) -> (Connection, Message) {
        (self.connection, self.message)
    }
}

/// Application logic invoked for every request.
pub trait Handler: Send + Sync + 'static {
    /// Handle one request.
    fn handle(&self, request: Request) -> impl Future<Output = ()> + Send;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct HandlerFn<F>(F);

/// Build a [`Handler`] from `Fn(Request) -> impl Future<Output = ()>`.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    HandlerFn(f)
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, request: Request) -> impl Future<Output = ()> + Send {
        (self.0)(request)
    }
}

/// Non-blocking hand-off of a request to application logic.
pub trait Dispatch: Send + Sync + 'static {
    /// Accept `request` for handling without waiting for it to run.
    fn dispatch(&self, request: Request);
}

/// Build the dispatcher selected by `config.worker_pool_size`.
///
/// Must be called inside a tokio runtime when the worker pool is enabled.
pub fn dispatcher<H: Handler>(config: &ConnConfig, handler: H) -> Arc<dyn Dispatch> {
    let handler = Arc::new(handler);
    if config.worker_pool_enabled() {
        Arc::new(WorkerPool::start(
            config.worker_pool_size,
            config.worker_queue_capacity,
            handler,
        ))
    } else {
        Arc::new(SpawnPerMessage::from_arc(handler))
    }
}

/// Runs every request on its own task.
pub struct SpawnPerMessage<H> {
    handler: Arc<H>,
}

impl<H: Handler> SpawnPerMessage<H> {
    /// Create a dispatcher owning `handler`.
    pub fn new(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Create a dispatcher sharing `handler`.
    pub fn from_arc(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

impl<H: Handler> Dispatch for SpawnPerMessage<H> {
    fn dispatch(&self, request: Request) {
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move { handler.handle(request).await });
    }
}

/// Fixed set of workers, each draining its own bounded task queue.
///
/// A request goes to worker `connection_id % size`, so requests of one
/// connection are handled in arrival order. Submission never waits: when
/// the chosen queue is full the request is dropped and logged. Workers stop
/// once the pool is dropped and their queues drain.
pub struct WorkerPool {
    queues: Vec<mpsc::Sender<Request>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) sharing `handler`.
    pub fn start<H: Handler>(size: usize, queue_capacity: usize, handler: Arc<H>) -> Self {
        let queues = (0..size.max(1))
            .map(|worker_id| {
                let (tx, rx) = mpsc::channel(queue_capacity.max(1));
                tokio::spawn(run_worker(worker_id, rx, Arc::clone(&handler)));
                tx
            })
            .collect();
        Self { queues }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.queues.len()
    }

    fn worker_for(&self, request: &Request) -> usize {
        (request.connection().id().as_u64() % self.queues.len() as u64) as usize
    }
}

impl Dispatch for WorkerPool {
    fn dispatch(&self, request: Request) {
        let worker = self.worker_for(&request);
        match self.queues[worker].try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => warn!(
                worker,
                conn_id = %request.connection().id(),
                protocol_id = request.protocol_id(),
                "worker queue full; dropping request"
            ),
            Err(TrySendError::Closed(request)) => warn!(
                worker,
                conn_id = %request.connection().id(),
                protocol_id = request.protocol_id(),
                "worker stopped; dropping request"
            ),
        }
    }
}

async fn run_worker<H: Handler>(worker_id: usize, mut rx: mpsc::Receiver<Request>, handler: Arc<H>) {
    debug!(worker_id, "worker started");
    while let Some(request) = rx.recv().await {
        let conn_id = request.connection().id();
        let protocol_id = request.protocol_id();
        if AssertUnwindSafe(handler.handle(request))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(worker_id, %conn_id, protocol_id, "handler panicked");
        }
    }
    debug!(worker_id, "worker stopped");
}
