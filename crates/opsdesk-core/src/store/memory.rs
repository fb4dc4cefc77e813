//! In-memory [`DataStore`] implementation: the local key-value mock that
//! stands in for a real backend. All invariants the trait demands atomicity
//! for are enforced under a single write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::DataStore;
use crate::error::StoreError;
use crate::models::{
    Conversation, ConversationId, Message, MessageId, NewNotification, NewTask, Notification,
    NotificationId, Recipients, Task, TaskId, User, UserId,
};

struct UserRecord {
    user: User,
    password: String,
}

#[derive(Default)]
struct State {
    users: Vec<UserRecord>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    /// Delivered notification copies, one list per recipient.
    inboxes: HashMap<UserId, Vec<Notification>>,
    /// Global task records.
    tasks: Vec<Task>,
    /// Per-assignee task copies.
    task_lists: HashMap<UserId, Vec<Task>>,
}

impl State {
    /// Keep the denormalized per-user unread counter in sync with the
    /// message table.
    fn refresh_unread_counter(&mut self, user_id: UserId) {
        let count = self
            .messages
            .iter()
            .filter(|m| m.recipient_id == user_id && !m.read)
            .count() as u32;
        if let Some(rec) = self.users.iter_mut().find(|r| r.user.id == user_id) {
            rec.user.unread_messages = count;
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account. Passwords are stored as-is; this is a mock, not a
    /// credential store.
    pub fn add_user(&self, user: User, password: &str) {
        let mut state = self.state.write();
        state.inboxes.entry(user.id).or_default();
        state.task_lists.entry(user.id).or_default();
        state.users.push(UserRecord {
            user,
            password: password.to_string(),
        });
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, StoreError> {
        let mut state = self.state.write();
        let now = Utc::now();
        Ok(state
            .users
            .iter_mut()
            .find(|r| r.user.email == email && r.password == password)
            .map(|r| {
                r.user.last_login = Some(now);
                r.user.last_active = Some(now);
                r.user.clone()
            }))
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.state.read().users.iter().map(|r| r.user.clone()).collect())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self
            .state
            .read()
            .users
            .iter()
            .find(|r| r.user.id == id)
            .map(|r| r.user.clone()))
    }

    async fn online_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self
            .state
            .read()
            .users
            .iter()
            .filter(|r| r.user.is_online)
            .map(|r| r.user.clone())
            .collect())
    }

    async fn conversations_for_user(&self, id: UserId) -> Result<Vec<Conversation>, StoreError> {
        Ok(self
            .state
            .read()
            .conversations
            .iter()
            .filter(|c| c.involves(id))
            .cloned()
            .collect())
    }

    async fn all_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        Ok(self.state.read().conversations.clone())
    }

    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        Ok(self.state.read().conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn create_or_get_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Conversation, StoreError> {
        let pair = Conversation::canonical_pair(a, b);
        // Lookup and insert happen under one write lock, so concurrent calls
        // for the same pair cannot create duplicates.
        let mut state = self.state.write();
        if !state.users.iter().any(|r| r.user.id == pair[0])
            || !state.users.iter().any(|r| r.user.id == pair[1])
        {
            return Err(StoreError::new("unknown participant"));
        }
        if let Some(existing) = state.conversations.iter().find(|c| c.participants == pair) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::generate(),
            participants: pair,
            created_at: now,
            last_message_at: now,
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read();
        if !state.conversations.iter().any(|c| c.id == conversation_id) {
            return Err(StoreError::new("conversation not found"));
        }
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|x, y| x.sent_at.cmp(&y.sent_at).then_with(|| x.id.cmp(&y.id)));
        Ok(messages)
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: &str,
    ) -> Result<Message, StoreError> {
        let mut state = self.state.write();
        let conversation = state
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
            .ok_or_else(|| StoreError::new("conversation not found"))?;
        if !conversation.involves(sender_id) {
            return Err(StoreError::new("sender is not a participant"));
        }
        let recipient_id = conversation
            .other_participant(sender_id)
            .ok_or_else(|| StoreError::new("conversation has no other participant"))?;

        let message = Message {
            id: MessageId::generate(),
            conversation_id,
            sender_id,
            recipient_id,
            text: text.to_string(),
            sent_at: Utc::now(),
            read: false,
        };
        state.messages.push(message.clone());
        if let Some(c) = state.conversations.iter_mut().find(|c| c.id == conversation_id) {
            c.last_message_at = message.sent_at;
        }
        state.refresh_unread_counter(recipient_id);
        Ok(message)
    }

    async fn mark_messages_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<Vec<MessageId>, StoreError> {
        let mut state = self.state.write();
        let mut flipped = Vec::new();
        for m in state.messages.iter_mut() {
            if m.conversation_id == conversation_id && m.sender_id != reader && !m.read {
                m.read = true;
                flipped.push(m.id);
            }
        }
        if !flipped.is_empty() {
            state.refresh_unread_counter(reader);
        }
        Ok(flipped)
    }

    async fn notifications(&self, user_id: UserId) -> Result<Vec<Notification>, StoreError> {
        Ok(self.state.read().inboxes.get(&user_id).cloned().unwrap_or_default())
    }

    async fn append_notification(
        &self,
        sender_id: UserId,
        new: &NewNotification,
    ) -> Result<Notification, StoreError> {
        let notification = Notification {
            id: NotificationId::generate(),
            title: new.title.clone(),
            message: new.message.clone(),
            priority: new.priority,
            kind: new.kind,
            sender_id,
            recipients: new.recipients.clone(),
            sent_at: Utc::now(),
            read: false,
        };

        let mut state = self.state.write();
        let recipient_ids: Vec<UserId> = match &new.recipients {
            Recipients::All => state.users.iter().map(|r| r.user.id).collect(),
            Recipients::Users(ids) => ids.clone(),
        };
        for id in recipient_ids {
            state.inboxes.entry(id).or_default().push(notification.clone());
        }
        Ok(notification)
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write();
        match state
            .inboxes
            .get_mut(&user_id)
            .and_then(|inbox| inbox.iter_mut().find(|n| n.id == id))
        {
            Some(copy) => {
                copy.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn tasks(&self, user_id: UserId) -> Result<Vec<Task>, StoreError> {
        Ok(self.state.read().task_lists.get(&user_id).cloned().unwrap_or_default())
    }

    async fn append_task(&self, assigner: UserId, new: &NewTask) -> Result<Task, StoreError> {
        let task = Task {
            id: TaskId::generate(),
            title: new.title.clone(),
            description: new.description.clone(),
            due_date: new.due_date,
            priority: new.priority,
            assigned_by: assigner,
            assignees: new.assignees.clone(),
            completed: false,
            created_at: Utc::now(),
        };

        let mut state = self.state.write();
        state.tasks.push(task.clone());
        for id in &new.assignees {
            state.task_lists.entry(*id).or_default().push(task.clone());
        }
        Ok(task)
    }

    async fn set_task_completed(&self, id: TaskId, completed: bool) -> Result<bool, StoreError> {
        // Global record and every assignee copy flip under the same lock; a
        // partially applied toggle is never observable.
        let mut state = self.state.write();
        let assignees = match state.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.completed = completed;
                task.assignees.clone()
            }
            None => return Ok(false),
        };
        for user_id in assignees {
            if let Some(copy) = state
                .task_lists
                .get_mut(&user_id)
                .and_then(|list| list.iter_mut().find(|t| t.id == id))
            {
                copy.completed = completed;
            }
        }
        Ok(true)
    }

    async fn set_online(&self, id: UserId, online: bool) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let rec = state
            .users
            .iter_mut()
            .find(|r| r.user.id == id)
            .ok_or_else(|| StoreError::new("user not found"))?;
        rec.user.is_online = online;
        if !online {
            rec.user.last_active = Some(Utc::now());
        }
        Ok(())
    }

    async fn touch_activity(&self, id: UserId) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let rec = state
            .users
            .iter_mut()
            .find(|r| r.user.id == id)
            .ok_or_else(|| StoreError::new("user not found"))?;
        rec.user.is_online = true;
        rec.user.last_active = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationKind, Priority, Role};
    use chrono::Duration;

    fn user(id: u64, role: Role) -> User {
        User {
            id: UserId(id),
            email: format!("user{id}@opsdesk.test"),
            name: format!("User {id}"),
            avatar: String::new(),
            role,
            is_online: false,
            last_active: None,
            last_login: None,
            unread_messages: 0,
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_user(user(1, Role::Admin), "pw1");
        store.add_user(user(2, Role::Frontend), "pw2");
        store.add_user(user(3, Role::Medical), "pw3");
        store
    }

    #[tokio::test]
    async fn conversation_creation_is_idempotent_and_commutative() {
        let store = seeded();
        let first = store.create_or_get_conversation(UserId(3), UserId(2)).await.unwrap();
        let second = store.create_or_get_conversation(UserId(2), UserId(3)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.participants, [UserId(2), UserId(3)]);
        assert_eq!(store.all_conversations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creation_does_not_duplicate() {
        let store = std::sync::Arc::new(seeded());
        let (a, b) = tokio::join!(
            store.create_or_get_conversation(UserId(2), UserId(3)),
            store.create_or_get_conversation(UserId(3), UserId(2)),
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(store.all_conversations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unread_counter_tracks_appends_and_reads() {
        let store = seeded();
        let conv = store.create_or_get_conversation(UserId(2), UserId(3)).await.unwrap();
        store.append_message(conv.id, UserId(2), "hello").await.unwrap();
        store.append_message(conv.id, UserId(2), "again").await.unwrap();

        let recipient = store.user(UserId(3)).await.unwrap().unwrap();
        assert_eq!(recipient.unread_messages, 2);

        let flipped = store.mark_messages_read(conv.id, UserId(3)).await.unwrap();
        assert_eq!(flipped.len(), 2);
        let recipient = store.user(UserId(3)).await.unwrap().unwrap();
        assert_eq!(recipient.unread_messages, 0);

        // Idempotent: nothing left to flip.
        assert!(store.mark_messages_read(conv.id, UserId(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notification_fanout_has_independent_read_flags() {
        let store = seeded();
        let sent = store
            .append_notification(
                UserId(1),
                &NewNotification {
                    title: "Standup".into(),
                    message: "10am".into(),
                    priority: Priority::Medium,
                    kind: NotificationKind::Info,
                    recipients: Recipients::All,
                },
            )
            .await
            .unwrap();

        assert!(store.mark_notification_read(sent.id, UserId(2)).await.unwrap());

        let for_two = store.notifications(UserId(2)).await.unwrap();
        let for_three = store.notifications(UserId(3)).await.unwrap();
        assert!(for_two[0].read);
        assert!(!for_three[0].read, "other recipients keep their own flag");
    }

    #[tokio::test]
    async fn task_completion_updates_global_and_assignee_copies_together() {
        let store = seeded();
        let task = store
            .append_task(
                UserId(1),
                &NewTask {
                    title: "Ship report".into(),
                    description: "weekly".into(),
                    due_date: Utc::now() + Duration::days(2),
                    priority: Priority::High,
                    assignees: vec![UserId(2), UserId(3)],
                },
            )
            .await
            .unwrap();

        assert!(store.set_task_completed(task.id, true).await.unwrap());
        for id in [UserId(2), UserId(3)] {
            let copy = &store.tasks(id).await.unwrap()[0];
            assert!(copy.completed, "per-assignee copy for {id} must not go stale");
        }

        // Toggles freely in both directions.
        assert!(store.set_task_completed(task.id, false).await.unwrap());
        assert!(!store.tasks(UserId(2)).await.unwrap()[0].completed);
    }

    #[tokio::test]
    async fn authenticate_rejects_either_wrong_field() {
        let store = seeded();
        assert!(store.authenticate("user2@opsdesk.test", "pw2").await.unwrap().is_some());
        assert!(store.authenticate("user2@opsdesk.test", "nope").await.unwrap().is_none());
        assert!(store.authenticate("nobody@opsdesk.test", "pw2").await.unwrap().is_none());
    }
}
