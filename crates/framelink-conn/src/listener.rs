use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use framelink_transport::{TransportError, WsSocket};

use crate::config::ConnConfig;
use crate::connection::Connection;
use crate::dispatch::Dispatch;
use crate::error::Result;
use crate::registry::{ConnectionRegistry, Reservation};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts WebSocket clients and turns each into a running [`Connection`].
pub struct WsListener {
    listener: TcpListener,
    config: ConnConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<dyn Dispatch>,
}

impl WsListener {
    /// Bind a TCP listener on `addr`.
    pub async fn bind(
        addr: SocketAddr,
        config: ConnConfig,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<dyn Dispatch>,
    ) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::bind(addr, e))?;
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;
        info!(addr = %local_addr, "listening for websocket clients");
        Ok(Self {
            listener,
            config,
            registry,
            dispatcher,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(TransportError::Io)?)
    }

    /// The registry new connections are added to.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Accept clients until `shutdown` fires, then close every connection.
    ///
    /// Upgrades still in flight are abandoned and awaited before the
    /// registry is closed, so no connection outlives this call.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Self {
            listener,
            config,
            registry,
            dispatcher,
        } = self;
        let upgrades = TaskTracker::new();

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %TransportError::Accept(err), "accept failed");
                        if !accept_backoff(&shutdown).await {
                            break;
                        }
                        continue;
                    }
                },
            };

            let reservation = match registry.try_reserve() {
                Ok(reservation) => reservation,
                Err(err) => {
                    warn!(%peer, error = %err, "rejecting connection");
                    continue;
                }
            };

            upgrades.spawn(upgrade_and_start(
                stream,
                peer,
                reservation,
                config.clone(),
                Arc::clone(&registry),
                Arc::clone(&dispatcher),
                shutdown.clone(),
            ));
        }

        drop(listener);
        upgrades.close();
        debug!(pending = upgrades.len(), "waiting for in-flight upgrades");
        upgrades.wait().await;

        info!("listener shutting down");
        registry.close_all();
        Ok(())
    }
}

/// Pause after a failed accept. Returns `false` when shutdown fired first.
async fn accept_backoff(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

// The reservation is held until the connection is registered, so the
// slot count briefly includes both.
async fn upgrade_and_start(
    stream: TcpStream,
    peer: SocketAddr,
    reservation: Reservation,
    config: ConnConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<dyn Dispatch>,
    shutdown: CancellationToken,
) {
    let upgrade = tokio::time::timeout(
        config.handshake_timeout,
        WsSocket::accept(stream, Some(peer), config.max_message_size),
    );
    let socket = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            debug!(%peer, "shutdown during websocket upgrade");
            return;
        }
        upgraded = upgrade => match upgraded {
            Ok(Ok(socket)) => socket,
            Ok(Err(err)) => {
                debug!(%peer, error = %err, "websocket upgrade failed");
                return;
            }
            Err(_) => {
                debug!(%peer, "websocket upgrade timed out");
                return;
            }
        },
    };

    match Connection::new(socket, &config, registry, dispatcher) {
        Ok(pending) => {
            pending.start();
        }
        Err(err) => warn!(%peer, error = %err, "cannot create connection"),
    }
    drop(reservation);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn accept_backoff_waits_before_retrying() {
        let shutdown = CancellationToken::new();
        let started = tokio::time::Instant::now();

        assert!(accept_backoff(&shutdown).await);
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn accept_backoff_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let started = tokio::time::Instant::now();

        assert!(!accept_backoff(&shutdown).await);
        assert!(started.elapsed() < ACCEPT_ERROR_BACKOFF);
    }
}
