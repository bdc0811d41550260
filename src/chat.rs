use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ids of locally-created messages that have not been confirmed by the
/// store yet. The prefix keeps them distinguishable from server ids.
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// A two-party thread between a guest and a property owner, optionally
/// anchored to a listing and a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub guest_id: String,
    pub owner_id: String,
    pub property_id: Option<String>,
    pub booking_id: Option<String>,
    pub last_message_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user_id: &str) -> bool {
        self.guest_id == user_id || self.owner_id == user_id
    }
}

/// Immutable once persisted. Ordered by `created_at` ascending within a
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A locally-generated placeholder shown ahead of store confirmation.
    /// Lives only in channel state until promoted or rolled back.
    pub fn provisional(conversation_id: &str, sender_id: &str, body: &str) -> Self {
        Self {
            id: format!("{}{}", PROVISIONAL_PREFIX, Uuid::new_v4().simple()),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(PROVISIONAL_PREFIX)
    }
}
