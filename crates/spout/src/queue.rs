//! Bounded FIFO queue between the stream reader and the consumer.
//!
//! The producer side never blocks: at capacity a push fails immediately so
//! the network reader can account the loss and keep draining the socket.

use tokio::sync::mpsc;

use crate::message::SpoutMessage;

/// Why a push was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Queue is at capacity.
    Full,
    /// Consumer side has been dropped.
    Closed,
}

/// Producer half, owned by the stream reader.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<SpoutMessage>,
}

/// Consumer half, held by the spout handle.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<SpoutMessage>,
}

/// Create a queue holding at most `capacity` undelivered messages.
pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

impl EventSender {
    /// Non-blocking insert. Fails with [`PushError::Full`] at capacity
    /// rather than waiting for the consumer.
    pub fn try_push(&self, message: SpoutMessage) -> Result<(), PushError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }
}

impl EventReceiver {
    /// Wait for the next message in FIFO order.
    ///
    /// Returns `None` once the queue is drained and the producer is gone.
    pub async fn recv(&mut self) -> Option<SpoutMessage> {
        self.rx.recv().await
    }

    /// Take the next message without waiting, if one is buffered.
    pub fn try_recv(&mut self) -> Option<SpoutMessage> {
        self.rx.try_recv().ok()
    }
}
