use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::ConversationId;
use super::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A chat message. Immutable after creation except for the read flag,
/// which transitions false to true exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// The conversation participant that is not the sender.
    pub recipient_id: UserId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

impl Message {
    /// Inbound from the given viewer's perspective.
    pub fn is_inbound_for(&self, viewer: UserId) -> bool {
        self.sender_id != viewer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_round_trips_ids_and_timestamps() {
        let message = Message {
            id: MessageId::generate(),
            conversation_id: ConversationId::generate(),
            sender_id: UserId(2),
            recipient_id: UserId(3),
            text: "hello".into(),
            sent_at: Utc::now(),
            read: false,
        };
        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, message.id);
        assert_eq!(back.conversation_id, message.conversation_id);
        assert_eq!(back.sent_at, message.sent_at);
    }
}
