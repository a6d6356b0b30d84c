//! Outbound messages held while the connection is down.

use std::collections::VecDeque;

use agui_core::outbound::OutboundMessage;
use tracing::warn;

/// Bounded FIFO; a push beyond capacity evicts the oldest message.
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<OutboundMessage>,
    capacity: usize,
}

impl OutboundQueue {
    /// A queue holding at most `capacity` messages. Zero disables queueing.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Append a message. Returns the message that was dropped to make room,
    /// if any.
    pub fn push(&mut self, message: OutboundMessage) -> Option<OutboundMessage> {
        if self.capacity == 0 {
            warn!(message_type = message.label(), "outbound queue disabled, dropping message");
            return Some(message);
        }
        let evicted = if self.items.len() >= self.capacity {
            let evicted = self.items.pop_front();
            if let Some(old) = &evicted {
                warn!(
                    message_type = old.label(),
                    capacity = self.capacity,
                    "outbound queue full, dropping oldest message"
                );
            }
            evicted
        } else {
            None
        };
        self.items.push_back(message);
        evicted
    }

    /// Take every queued message, oldest first.
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        self.items.drain(..).collect()
    }

    /// Put messages back at the front, keeping their order.
    pub fn requeue_front(&mut self, messages: Vec<OutboundMessage>) {
        for message in messages.into_iter().rev() {
            self.items.push_front(message);
        }
        while self.items.len() > self.capacity {
            let _ = self.items.pop_back();
        }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
