//! Notification and task feed: the same reconcile-against-the-store pattern
//! as the conversation engine, at lower weight. Notifications arrive via
//! poll (store reads) and push; both merge into one id-keyed cache.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use crate::config::CoreConfig;
use crate::error::{call_with_timeout, CoreError, Result};
use crate::events::CoreEvent;
use crate::merge::merge_notifications;
use crate::models::{
    NewNotification, NewTask, Notification, NotificationId, NotificationKind, Recipients, Task,
    TaskId,
};
use crate::session::Session;
use crate::store::DataStore;
use crate::transport::Transport;

struct FeedInner {
    store: Arc<dyn DataStore>,
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    events: broadcast::Sender<CoreEvent>,
    config: CoreConfig,
    notifications: Mutex<Vec<Notification>>,
}

#[derive(Clone)]
pub struct Feed {
    inner: Arc<FeedInner>,
}

impl Feed {
    pub fn new(
        store: Arc<dyn DataStore>,
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
        events: broadcast::Sender<CoreEvent>,
        config: CoreConfig,
    ) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                store,
                transport,
                session,
                events,
                config,
                notifications: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Dispatch a notification. The input is taken by reference so a failed
    /// send leaves the caller's draft intact for resubmission; failed sends
    /// are never retried silently.
    pub async fn send_notification(&self, new: &NewNotification) -> Result<Notification> {
        let me = self.inner.session.require_user()?;
        if new.title.trim().is_empty() {
            return Err(CoreError::Validation("notification title is required".into()));
        }
        if new.message.trim().is_empty() {
            return Err(CoreError::Validation("notification message is required".into()));
        }
        if let Recipients::Users(ids) = &new.recipients {
            if ids.is_empty() {
                return Err(CoreError::Validation("at least one recipient is required".into()));
            }
        }

        let sent = call_with_timeout(
            self.inner.config.call_timeout,
            self.inner.transport.send_notification(me.id, new),
        )
        .await?;
        let _ = self.inner.events.send(CoreEvent::NotificationsChanged);
        Ok(sent)
    }

    /// Refresh from the store and return the merged cache, newest first.
    pub async fn notifications(&self) -> Result<Vec<Notification>> {
        let me = self.inner.session.require_user()?;
        let fetched = call_with_timeout(
            self.inner.config.call_timeout,
            self.inner.store.notifications(me.id),
        )
        .await?;
        let mut cache = self.inner.notifications.lock();
        merge_notifications(&mut cache, fetched);
        Ok(cache.clone())
    }

    /// Monotonic and idempotent: re-marking a read notification changes
    /// nothing.
    pub async fn mark_notification_read(&self, id: NotificationId) -> Result<()> {
        let me = self.inner.session.require_user()?;
        let found = call_with_timeout(
            self.inner.config.call_timeout,
            self.inner.store.mark_notification_read(id, me.id),
        )
        .await?;
        if !found {
            return Err(CoreError::NotFound(format!("notification {id}")));
        }
        {
            let mut cache = self.inner.notifications.lock();
            if let Some(copy) = cache.iter_mut().find(|n| n.id == id) {
                copy.read = true;
            }
        }
        let _ = self.inner.events.send(CoreEvent::NotificationsChanged);
        Ok(())
    }

    pub async fn unread_notifications(&self) -> Result<u32> {
        Ok(self.notifications().await?.iter().filter(|n| !n.read).count() as u32)
    }

    /// Assign a task to one or more users. Validation failures surface
    /// before any write. The assignment itself goes to the store; a
    /// companion task notification is pushed best-effort when the transport
    /// is up, matching the separate-call semantics of the dashboard.
    pub async fn assign_task(&self, new: &NewTask) -> Result<Task> {
        let me = self.inner.session.require_user()?;
        if new.title.trim().is_empty() {
            return Err(CoreError::Validation("task title is required".into()));
        }
        if new.description.trim().is_empty() {
            return Err(CoreError::Validation("task description is required".into()));
        }
        if new.assignees.is_empty() {
            return Err(CoreError::Validation("at least one assignee is required".into()));
        }
        if new.due_date < Utc::now() {
            return Err(CoreError::Validation("due date must not be in the past".into()));
        }

        let task = call_with_timeout(
            self.inner.config.call_timeout,
            self.inner.store.append_task(me.id, new),
        )
        .await?;
        let _ = self.inner.events.send(CoreEvent::TasksChanged);

        if self.inner.transport.is_connected() {
            let heads_up = NewNotification {
                title: "New Task Assigned".into(),
                message: new.title.clone(),
                priority: new.priority,
                kind: NotificationKind::Task,
                recipients: Recipients::Users(new.assignees.clone()),
            };
            if let Err(e) = call_with_timeout(
                self.inner.config.call_timeout,
                self.inner.transport.send_notification(me.id, &heads_up),
            )
            .await
            {
                warn!(task = %task.id, error = %e, "task notification not delivered");
            }
        }
        Ok(task)
    }

    /// The current user's tasks, closest due date first.
    pub async fn tasks(&self) -> Result<Vec<Task>> {
        let me = self.inner.session.require_user()?;
        let mut tasks =
            call_with_timeout(self.inner.config.call_timeout, self.inner.store.tasks(me.id))
                .await?;
        tasks.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    /// Toggle completion in either direction. The store flips the global
    /// record and every assignee copy atomically.
    pub async fn set_task_completed(&self, id: TaskId, completed: bool) -> Result<()> {
        self.inner.session.require_user()?;
        let found = call_with_timeout(
            self.inner.config.call_timeout,
            self.inner.store.set_task_completed(id, completed),
        )
        .await?;
        if !found {
            return Err(CoreError::NotFound(format!("task {id}")));
        }
        let _ = self.inner.events.send(CoreEvent::TasksChanged);
        Ok(())
    }

    /// Pushed notification copy; merged through the same routine the poll
    /// path uses.
    pub fn apply_push(&self, notification: Notification) {
        let is_task = notification.kind == NotificationKind::Task;
        let changed = {
            let mut cache = self.inner.notifications.lock();
            merge_notifications(&mut cache, [notification])
        };
        if changed {
            let _ = self.inner.events.send(CoreEvent::NotificationsChanged);
            if is_task {
                let _ = self.inner.events.send(CoreEvent::TasksChanged);
            }
        }
    }

    /// Drop cached state, e.g. on logout.
    pub fn clear(&self) {
        self.inner.notifications.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EVENT_CHANNEL_CAPACITY;
    use crate::models::{NotificationId, Priority, Role, User, UserId};
    use crate::store::MemoryStore;
    use crate::transport::LoopbackTransport;
    use chrono::Duration;

    fn user(id: u64, role: Role) -> User {
        User {
            id: UserId(id),
            email: format!("u{id}@opsdesk.test"),
            name: format!("User {id}"),
            avatar: String::new(),
            role,
            is_online: false,
            last_active: None,
            last_login: None,
            unread_messages: 0,
        }
    }

    async fn feed_for(store: Arc<MemoryStore>, id: u64) -> Feed {
        let transport = Arc::new(LoopbackTransport::new(store.clone()));
        transport.connect(UserId(id)).await.unwrap();
        let session = Arc::new(Session::new(store.clone(), CoreConfig::default()));
        session
            .login(&format!("u{id}@opsdesk.test"), "pw", false)
            .await
            .unwrap();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Feed::new(store, transport, session, events, CoreConfig::default())
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.add_user(user(1, Role::Admin), "pw");
        store.add_user(user(2, Role::Frontend), "pw");
        store.add_user(user(3, Role::Medical), "pw");
        Arc::new(store)
    }

    fn alert(title: &str, recipients: Recipients) -> NewNotification {
        NewNotification {
            title: title.into(),
            message: "body".into(),
            priority: Priority::High,
            kind: NotificationKind::Alert,
            recipients,
        }
    }

    #[tokio::test]
    async fn notification_validation_rejects_blank_fields_and_empty_recipients() {
        let store = seeded();
        let feed = feed_for(store.clone(), 1).await;

        let blank = feed.send_notification(&alert("   ", Recipients::All)).await;
        assert!(matches!(blank, Err(CoreError::Validation(_))));

        let nobody = feed
            .send_notification(&alert("Outage", Recipients::Users(Vec::new())))
            .await;
        assert!(matches!(nobody, Err(CoreError::Validation(_))));
        assert!(store.notifications(UserId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_recipient_with_independent_flags() {
        let store = seeded();
        let sender = feed_for(store.clone(), 1).await;
        sender.send_notification(&alert("Maintenance", Recipients::All)).await.unwrap();

        let reader = feed_for(store.clone(), 2).await;
        let inbox = reader.notifications().await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert!(!inbox[0].read);
        assert_eq!(reader.unread_notifications().await.unwrap(), 1);

        reader.mark_notification_read(inbox[0].id).await.unwrap();
        assert_eq!(reader.unread_notifications().await.unwrap(), 0);
        // Another recipient's copy is untouched.
        assert!(!store.notifications(UserId(3)).await.unwrap()[0].read);
    }

    #[tokio::test]
    async fn marking_an_undelivered_notification_is_not_found() {
        let feed = feed_for(seeded(), 2).await;
        let err = feed.mark_notification_read(NotificationId::generate()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn task_assignment_validates_then_notifies_assignees() {
        let store = seeded();
        let feed = feed_for(store.clone(), 1).await;

        let stale = NewTask {
            title: "Backfill".into(),
            description: "last week".into(),
            due_date: Utc::now() - Duration::days(1),
            priority: Priority::Low,
            assignees: vec![UserId(2)],
        };
        assert!(matches!(
            feed.assign_task(&stale).await,
            Err(CoreError::Validation(_))
        ));

        let task = feed
            .assign_task(&NewTask {
                title: "Ship report".into(),
                description: "weekly".into(),
                due_date: Utc::now() + Duration::days(2),
                priority: Priority::High,
                assignees: vec![UserId(2), UserId(3)],
            })
            .await
            .unwrap();
        assert!(!task.completed);

        // Assignees get the task copy and a companion notification.
        assert_eq!(store.tasks(UserId(2)).await.unwrap().len(), 1);
        let inbox = store.notifications(UserId(3)).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::Task);
        assert_eq!(inbox[0].message, "Ship report");
    }

    #[tokio::test]
    async fn tasks_come_back_closest_due_date_first() {
        let store = seeded();
        let feed = feed_for(store.clone(), 1).await;
        for (title, days) in [("later", 9), ("soon", 1), ("mid", 4)] {
            feed.assign_task(&NewTask {
                title: title.into(),
                description: "d".into(),
                due_date: Utc::now() + Duration::days(days),
                priority: Priority::Medium,
                assignees: vec![UserId(1)],
            })
            .await
            .unwrap();
        }
        let titles: Vec<String> = feed.tasks().await.unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["soon", "mid", "later"]);
    }

    #[tokio::test]
    async fn completion_round_trips_and_unknown_ids_are_not_found() {
        let store = seeded();
        let feed = feed_for(store.clone(), 1).await;
        let task = feed
            .assign_task(&NewTask {
                title: "Flip me".into(),
                description: "d".into(),
                due_date: Utc::now() + Duration::days(1),
                priority: Priority::Low,
                assignees: vec![UserId(1)],
            })
            .await
            .unwrap();

        feed.set_task_completed(task.id, true).await.unwrap();
        assert!(feed.tasks().await.unwrap()[0].completed);
        feed.set_task_completed(task.id, false).await.unwrap();
        assert!(!feed.tasks().await.unwrap()[0].completed);

        let err = feed.set_task_completed(TaskId::generate(), true).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn pushed_copies_merge_ahead_of_the_next_poll() {
        let store = seeded();
        let feed = feed_for(store.clone(), 2).await;

        let pushed = Notification {
            id: NotificationId::generate(),
            title: "Hotfix".into(),
            message: "deploying".into(),
            priority: Priority::High,
            kind: NotificationKind::Alert,
            sender_id: UserId(1),
            recipients: Recipients::All,
            sent_at: Utc::now(),
            read: false,
        };
        feed.apply_push(pushed.clone());

        let inbox = feed.notifications().await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, pushed.id);
    }
}
