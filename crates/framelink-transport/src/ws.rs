use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{MessageSink, MessageSocket, MessageSource, MessageType, RawMessage};

/// WebSocket transport.
///
/// Wraps an upgraded `tokio-tungstenite` stream. Ping/pong control frames are
/// absorbed here (tungstenite answers pings on its next flush), a close frame
/// is reported as EOF.
pub struct WsSocket<S> {
    stream: WebSocketStream<S>,
    remote_addr: Option<SocketAddr>,
}

impl<S> WsSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already upgraded WebSocket stream.
    pub fn new(stream: WebSocketStream<S>, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            stream,
            remote_addr,
        }
    }

    /// Perform the server side of the WebSocket upgrade on an accepted stream.
    ///
    /// `max_message_size` caps both the reassembled message and a single
    /// WebSocket frame.
    pub async fn accept(
        stream: S,
        remote_addr: Option<SocketAddr>,
        max_message_size: usize,
    ) -> Result<Self> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(max_message_size);
        config.max_frame_size = Some(max_message_size);

        let ws = tokio_tungstenite::accept_async_with_config(stream, Some(config)).await?;
        debug!(?remote_addr, "websocket upgrade complete");
        Ok(Self::new(ws, remote_addr))
    }
}

impl WsSocket<MaybeTlsStream<TcpStream>> {
    /// Connect to a WebSocket server as a client.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            TransportError::Connect {
                url: url.to_string(),
                source: Box::new(e),
            }
        })?;

        let remote_addr = match ws.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp.peer_addr().ok(),
            _ => None,
        };
        debug!(url, ?remote_addr, "connected to websocket server");
        Ok(Self::new(ws, remote_addr))
    }
}

impl<S> MessageSocket for WsSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Source = WsSource<S>;
    type Sink = WsSink<S>;

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn split(self) -> (Self::Sink, Self::Source) {
        let (sink, stream) = self.stream.split();
        (WsSink { inner: sink }, WsSource { inner: stream })
    }
}

/// Read half of a [`WsSocket`].
pub struct WsSource<S> {
    inner: SplitStream<WebSocketStream<S>>,
}

impl<S> MessageSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<RawMessage>> {
        loop {
            let message = match self.inner.next().await {
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Ok(None)
                }
                Some(Err(err)) => return Err(err.into()),
            };

            match message {
                Message::Binary(data) => return Ok(Some(RawMessage::binary(data))),
                Message::Text(text) => {
                    return Ok(Some(RawMessage::text(Bytes::copy_from_slice(
                        text.as_bytes(),
                    ))))
                }
                Message::Close(frame) => {
                    debug!(?frame, "peer sent close frame");
                    return Ok(None);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("skipping control frame");
                }
            }
        }
    }
}

/// Write half of a [`WsSocket`].
pub struct WsSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> MessageSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: RawMessage) -> Result<()> {
        let message = match message.kind {
            MessageType::Binary => Message::Binary(message.data),
            MessageType::Text => {
                let text = String::from_utf8(message.data.to_vec())
                    .map_err(|_| TransportError::InvalidText)?;
                Message::text(text)
            }
        };
        match self.inner.send(message).await {
            Ok(()) => Ok(()),
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Err(TransportError::Closed),
            Err(err) => Err(err.into()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.inner.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
