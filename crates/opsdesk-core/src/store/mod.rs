pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    Conversation, ConversationId, Message, MessageId, NewNotification, NewTask, Notification,
    NotificationId, Task, TaskId, User, UserId,
};

/// The persistence collaborator. The store is the sole writer of durable
/// state; everything the core holds is a read-through cache on top of it.
/// All operations may fail with a generic [`StoreError`].
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Verify credentials and stamp the login time. `None` means the
    /// email/password pair did not match any account; callers must not
    /// learn which half was wrong.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, StoreError>;

    async fn users(&self) -> Result<Vec<User>, StoreError>;
    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn online_users(&self) -> Result<Vec<User>, StoreError>;

    async fn conversations_for_user(&self, id: UserId) -> Result<Vec<Conversation>, StoreError>;
    /// Every conversation system-wide. Privileged; role enforcement lives in
    /// the sync engine, closer to the session.
    async fn all_conversations(&self) -> Result<Vec<Conversation>, StoreError>;
    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError>;
    /// Idempotent, commutative lookup-or-create keyed by the canonical
    /// participant pair. Must be atomic at the store boundary: concurrent
    /// calls for the same pair return the same conversation.
    async fn create_or_get_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Conversation, StoreError>;

    async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>, StoreError>;
    async fn append_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: &str,
    ) -> Result<Message, StoreError>;
    /// Flip every unread inbound message in the conversation for `reader`.
    /// Already-read messages are untouched; returns the ids actually flipped.
    async fn mark_messages_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<Vec<MessageId>, StoreError>;

    async fn notifications(&self, user_id: UserId) -> Result<Vec<Notification>, StoreError>;
    /// Deliver one copy per recipient ("all" fans out to every current
    /// user); each copy carries its own read flag.
    async fn append_notification(
        &self,
        sender_id: UserId,
        new: &NewNotification,
    ) -> Result<Notification, StoreError>;
    /// Monotonic and idempotent. Returns false when the user has no such
    /// delivered copy.
    async fn mark_notification_read(
        &self,
        id: NotificationId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;

    async fn tasks(&self, user_id: UserId) -> Result<Vec<Task>, StoreError>;
    async fn append_task(&self, assigner: UserId, new: &NewTask) -> Result<Task, StoreError>;
    /// Toggle completion on the global record and every assignee copy in one
    /// atomic step. Returns false for an unknown task id.
    async fn set_task_completed(&self, id: TaskId, completed: bool) -> Result<bool, StoreError>;

    async fn set_online(&self, id: UserId, online: bool) -> Result<(), StoreError>;
    async fn touch_activity(&self, id: UserId) -> Result<(), StoreError>;
}
