use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::traits::{MessageSink, MessageSocket, MessageSource, RawMessage};

/// One end of an in-process socket pair.
///
/// Messages sent on one end arrive, whole and in order, at the other end.
/// Closing (or dropping) the write half makes the peer's next `recv` report
/// EOF.
pub struct MemorySocket {
    tx: mpsc::Sender<RawMessage>,
    rx: mpsc::Receiver<RawMessage>,
    remote_addr: Option<SocketAddr>,
}

/// Create two connected in-process sockets.
///
/// `capacity` bounds the number of in-flight messages per direction; a full
/// direction makes `send` wait, like a socket with a full send buffer.
pub fn pair(capacity: usize) -> (MemorySocket, MemorySocket) {
    let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
    (
        MemorySocket {
            tx: a_tx,
            rx: a_rx,
            remote_addr: None,
        },
        MemorySocket {
            tx: b_tx,
            rx: b_rx,
            remote_addr: None,
        },
    )
}

impl MemorySocket {
    /// Report `addr` as this end's remote address.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl MessageSocket for MemorySocket {
    type Source = MemorySource;
    type Sink = MemorySink;

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn split(self) -> (Self::Sink, Self::Source) {
        (
            MemorySink { tx: Some(self.tx) },
            MemorySource { rx: self.rx },
        )
    }
}

/// Read half of a [`MemorySocket`].
pub struct MemorySource {
    rx: mpsc::Receiver<RawMessage>,
}

impl MessageSource for MemorySource {
    async fn recv(&mut self) -> Result<Option<RawMessage>> {
        Ok(self.rx.recv().await)
    }
}

/// Write half of a [`MemorySocket`].
pub struct MemorySink {
    tx: Option<mpsc::Sender<RawMessage>>,
}

impl MessageSink for MemorySink {
    async fn send(&mut self, message: RawMessage) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(message).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (left, right) = pair(8);
        let (mut sink, _source) = left.split();
        let (_peer_sink, mut peer_source) = right.split();

        for i in 0..3u8 {
            sink.send(RawMessage::binary(vec![i])).await.unwrap();
        }

        for i in 0..3u8 {
            let msg = peer_source.recv().await.unwrap().unwrap();
            assert_eq!(msg.data.as_ref(), &[i]);
        }
    }

    #[tokio::test]
    async fn close_reports_eof_to_peer() {
        let (left, right) = pair(1);
        let (mut sink, _source) = left.split();
        let (_peer_sink, mut peer_source) = right.split();

        sink.close().await.unwrap();

        assert!(peer_source.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (left, _right) = pair(1);
        let (mut sink, _source) = left.split();

        sink.close().await.unwrap();
        let err = sink
            .send(RawMessage::binary(Bytes::from_static(b"late")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn send_to_dropped_peer_fails() {
        let (left, right) = pair(1);
        drop(right);
        let (mut sink, _source) = left.split();

        let err = sink
            .send(RawMessage::binary(Bytes::from_static(b"x")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn remote_addr_is_configurable() {
        let (left, _right) = pair(1);
        assert!(left.remote_addr().is_none());

        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let left = left.with_remote_addr(addr);
        assert_eq!(left.remote_addr(), Some(addr));
    }
}
