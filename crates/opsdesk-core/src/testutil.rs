//! Fault-injecting store double shared by the component test modules.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    Conversation, ConversationId, Message, MessageId, NewNotification, NewTask, Notification,
    NotificationId, Task, TaskId, User, UserId,
};
use crate::store::{DataStore, MemoryStore};

/// Delegates to a seeded [`MemoryStore`] with two injectable faults: roster
/// reads can fail, and conversation-list reads can hang forever.
pub(crate) struct FaultyStore {
    inner: MemoryStore,
    pub fail_roster_reads: AtomicBool,
    pub wedge_conversation_reads: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_roster_reads: AtomicBool::new(false),
            wedge_conversation_reads: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DataStore for FaultyStore {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, StoreError> {
        self.inner.authenticate(email, password).await
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        if self.fail_roster_reads.load(Ordering::SeqCst) {
            return Err(StoreError::new("roster unavailable"));
        }
        self.inner.users().await
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.user(id).await
    }

    async fn online_users(&self) -> Result<Vec<User>, StoreError> {
        self.inner.online_users().await
    }

    async fn conversations_for_user(&self, id: UserId) -> Result<Vec<Conversation>, StoreError> {
        if self.wedge_conversation_reads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.conversations_for_user(id).await
    }

    async fn all_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        self.inner.all_conversations().await
    }

    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        self.inner.conversation(id).await
    }

    async fn create_or_get_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Conversation, StoreError> {
        self.inner.create_or_get_conversation(a, b).await
    }

    async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>, StoreError> {
        self.inner.messages(conversation_id).await
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: &str,
    ) -> Result<Message, StoreError> {
        self.inner.append_message(conversation_id, sender_id, text).await
    }

    async fn mark_messages_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<Vec<MessageId>, StoreError> {
        self.inner.mark_messages_read(conversation_id, reader).await
    }

    async fn notifications(&self, user_id: UserId) -> Result<Vec<Notification>, StoreError> {
        self.inner.notifications(user_id).await
    }

    async fn append_notification(
        &self,
        sender_id: UserId,
        new: &NewNotification,
    ) -> Result<Notification, StoreError> {
        self.inner.append_notification(sender_id, new).await
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        self.inner.mark_notification_read(id, user_id).await
    }

    async fn tasks(&self, user_id: UserId) -> Result<Vec<Task>, StoreError> {
        self.inner.tasks(user_id).await
    }

    async fn append_task(&self, assigner: UserId, new: &NewTask) -> Result<Task, StoreError> {
        self.inner.append_task(assigner, new).await
    }

    async fn set_task_completed(&self, id: TaskId, completed: bool) -> Result<bool, StoreError> {
        self.inner.set_task_completed(id, completed).await
    }

    async fn set_online(&self, id: UserId, online: bool) -> Result<(), StoreError> {
        self.inner.set_online(id, online).await
    }

    async fn touch_activity(&self, id: UserId) -> Result<(), StoreError> {
        self.inner.touch_activity(id).await
    }
}
