//! EventQueue - unbounded FIFO between posters and the dispatch worker
//!
//! Multi-producer, single-consumer. Producers never block; the consumer
//! blocks while the queue is empty.

use async_channel::{unbounded, Receiver, Sender, TryRecvError};

use contracts::EventPacket;

/// Queue entry
#[derive(Debug, Clone, PartialEq)]
pub enum QueueMessage {
    /// Packet to broadcast
    Deliver(EventPacket),
    /// Wake the worker and make it exit; never delivered
    Shutdown,
}

/// Returned when the consumer side is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

/// Create a connected producer/consumer pair
pub fn event_queue() -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = unbounded();
    (QueueProducer { tx }, QueueConsumer { rx })
}

/// Posting side of the queue
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: Sender<QueueMessage>,
}

impl QueueProducer {
    /// Enqueue a message without blocking
    pub fn push(&self, message: QueueMessage) -> Result<(), QueueClosed> {
        // Unbounded: the only failure is a dropped consumer.
        self.tx.try_send(message).map_err(|_| QueueClosed)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Worker side of the queue
#[derive(Debug)]
pub struct QueueConsumer {
    rx: Receiver<QueueMessage>,
}

impl QueueConsumer {
    /// Block until a message arrives
    ///
    /// Returns `None` once every producer is gone and the queue is empty.
    pub fn pop(&self) -> Option<QueueMessage> {
        self.rx.recv_blocking().ok()
    }

    /// Take everything currently queued without blocking
    pub fn drain(&self) -> Vec<QueueMessage> {
        let mut remaining = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(message) => remaining.push(message),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        remaining
    }
}
