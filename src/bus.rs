use crate::chat::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Change events fanned out to every connected listener. This is the
/// in-process stand-in for a hosted realtime feed: row-level inserts and
/// updates, delivered after the store write that caused them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A message row was inserted into a conversation.
    MessageInserted(Message),

    /// A conversation was created or its `last_message_at` moved forward.
    ConversationTouched {
        conversation_id: String,
        last_message_at: DateTime<Utc>,
    },

    /// A booking for this property was created or changed status.
    /// Availability views should refetch occupied dates.
    BookingChanged {
        property_id: String,
        booking_id: String,
    },

    /// An owner block for this property was added or removed.
    BlockChanged { property_id: String },

    /// A listing was created or moderated.
    PropertyChanged { property_id: String },
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // We ignore the error if there are no receivers
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
