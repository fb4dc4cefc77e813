use crate::models::{ConversationId, UserId};

/// Change notifications for UI observers. The core emits these instead of
/// touching display state; every cache mutation is followed by exactly one
/// coherent emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    ConversationListChanged,
    MessagesChanged(ConversationId),
    /// Total unread messages across all of the current user's conversations.
    UnreadCountChanged(u32),
    PresenceChanged(UserId),
    NotificationsChanged,
    TasksChanged,
    Connected,
    Disconnected,
}
