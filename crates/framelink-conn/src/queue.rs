use framelink_frame::Message;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::{ConnError, Result};

/// Bounded FIFO of messages waiting for the write pump.
///
/// Producers never block: a full queue sheds the new message with
/// [`ConnError::QueueFull`]. The write pump is the only consumer.
#[derive(Debug)]
pub struct OutboundQueue {
    tx: mpsc::Sender<Message>,
    closed: CancellationToken,
    capacity: usize,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` messages.
    ///
    /// `closed` is the connection's close signal; once it fires every
    /// enqueue fails. `capacity` must be non-zero.
    pub fn bounded(capacity: usize, closed: CancellationToken) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                closed,
                capacity,
            },
            rx,
        )
    }

    /// Append a message without waiting.
    pub fn enqueue(&self, message: Message) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(ConnError::ConnectionClosed);
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ConnError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(ConnError::ConnectionClosed),
        }
    }

    /// Number of messages currently waiting.
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    /// Whether no message is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
