//! Message history
//!
//! Ordered, deduplicated message list shared by the history fetch and the
//! live feed. Both paths race, so every mutation is keyed on message id.

use super::models::{Message, MessageId};
use std::collections::HashSet;

/// Ordered message list with at most one entry per id
#[derive(Debug, Clone, Default)]
pub struct MessageHistory {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    live_received: bool,
}

impl MessageHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one live message
    ///
    /// Appends when the id is unseen. Returns `false` if the message was a
    /// duplicate and got discarded.
    pub fn merge(&mut self, message: Message) -> bool {
        self.live_received = true;
        if !self.ids.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Apply a fetched history batch
    ///
    /// Before any live message has arrived the batch replaces the list. After
    /// that, batch entries not already held go first and the held messages
    /// follow in their existing order. A batch entry that was already received
    /// live stays where it arrived, so live messages are never dropped or
    /// reordered.
    pub fn apply_fetched(&mut self, batch: Vec<Message>) {
        if !self.live_received {
            self.messages.clear();
            self.ids.clear();
            for message in batch {
                if self.ids.insert(message.id) {
                    self.messages.push(message);
                }
            }
            return;
        }

        let held = std::mem::take(&mut self.messages);
        for message in batch {
            if self.ids.insert(message.id) {
                self.messages.push(message);
            }
        }
        self.messages.extend(held);
    }

    /// Whether a message with this id is present
    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    /// Messages in display order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages held
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
