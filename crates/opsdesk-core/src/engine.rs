//! Conversation sync engine: owns the ordered conversation list, the
//! per-conversation message cache, unread counters, and the single open
//! conversation with its poll loop. Poll results and transport pushes feed
//! the same delta-merge routine, so the two producers can never tear the
//! cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::error::{call_with_timeout, CoreError, Result, TransportError};
use crate::events::CoreEvent;
use crate::merge::merge_messages;
use crate::models::{
    Conversation, ConversationId, ConversationOverview, ConversationView, Message, Peer, UserId,
};
use crate::session::Session;
use crate::store::DataStore;
use crate::transport::Transport;

struct OpenConversation {
    id: ConversationId,
    /// Dropping or signalling this stops the poll loop; both are no-ops the
    /// second time.
    stop: watch::Sender<bool>,
}

#[derive(Default)]
struct EngineState {
    conversations: Vec<ConversationView>,
    messages: HashMap<ConversationId, Vec<Message>>,
    open: Option<OpenConversation>,
}

impl EngineState {
    fn total_unread(&self) -> u32 {
        self.conversations.iter().map(|v| v.unread_count).sum()
    }

    /// Canonical list ordering: most recent activity first, conversation id
    /// ascending as the stable tie-break.
    fn sort_conversations(&mut self) {
        self.conversations.sort_by(|a, b| {
            b.activity_at()
                .cmp(&a.activity_at())
                .then_with(|| a.conversation.id.cmp(&b.conversation.id))
        });
    }
}

struct EngineInner {
    store: Arc<dyn DataStore>,
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    events: broadcast::Sender<CoreEvent>,
    config: CoreConfig,
    state: Mutex<EngineState>,
}

#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn DataStore>,
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
        events: broadcast::Sender<CoreEvent>,
        config: CoreConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                transport,
                session,
                events,
                config,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Fetch and merge the current user's conversations: the other
    /// participant's profile, the latest message, and the unread count per
    /// conversation, in the canonical ordering.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationView>> {
        let me = self.inner.session.require_user()?;
        let limit = self.inner.config.call_timeout;
        let conversations =
            call_with_timeout(limit, self.inner.store.conversations_for_user(me.id)).await?;

        let mut views = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let peer = match conversation.other_participant(me.id) {
                Some(id) => call_with_timeout(limit, self.inner.store.user(id))
                    .await?
                    .map(|u| Peer::from(&u)),
                None => None,
            };
            let messages =
                call_with_timeout(limit, self.inner.store.messages(conversation.id)).await?;
            let last_message = messages.last().cloned();
            let unread_count = messages
                .iter()
                .filter(|m| m.is_inbound_for(me.id) && !m.read)
                .count() as u32;
            views.push(ConversationView {
                conversation,
                peer,
                last_message,
                unread_count,
            });
        }

        let (views, total) = {
            let mut state = self.inner.state.lock();
            state.conversations = views;
            state.sort_conversations();
            (state.conversations.clone(), state.total_unread())
        };
        let _ = self.inner.events.send(CoreEvent::ConversationListChanged);
        let _ = self.inner.events.send(CoreEvent::UnreadCountChanged(total));
        Ok(views)
    }

    /// Open a conversation: load its history ascending, acknowledge inbound
    /// messages, and start the 3s poll loop. Any previously open
    /// conversation's loop is stopped first.
    pub async fn open_conversation(&self, id: ConversationId) -> Result<Vec<Message>> {
        let me = self.inner.session.require_user()?;
        let limit = self.inner.config.call_timeout;
        let conversation = call_with_timeout(limit, self.inner.store.conversation(id))
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("conversation {id}")))?;
        if !conversation.involves(me.id) {
            return Err(CoreError::Authorization(
                "not a participant in this conversation".into(),
            ));
        }

        self.close_conversation();

        // Re-marking already-read messages is a no-op at the store.
        call_with_timeout(limit, self.inner.store.mark_messages_read(id, me.id)).await?;
        let history = call_with_timeout(limit, self.inner.store.messages(id)).await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let total = {
            let mut state = self.inner.state.lock();
            state.messages.insert(id, history.clone());
            state.open = Some(OpenConversation { id, stop: stop_tx });
            if let Some(view) = state.conversations.iter_mut().find(|v| v.conversation.id == id) {
                view.unread_count = 0;
                view.last_message = history.last().cloned();
            }
            state.sort_conversations();
            state.total_unread()
        };
        let _ = self.inner.events.send(CoreEvent::MessagesChanged(id));
        let _ = self.inner.events.send(CoreEvent::ConversationListChanged);
        let _ = self.inner.events.send(CoreEvent::UnreadCountChanged(total));

        self.spawn_poll_loop(id, me.id, stop_rx);
        debug!(conversation = %id, "conversation opened");
        Ok(history)
    }

    /// Stop the open conversation's poll loop. Safe to call when nothing is
    /// open or the loop already stopped.
    pub fn close_conversation(&self) {
        let open = self.inner.state.lock().open.take();
        if let Some(open) = open {
            let _ = open.stop.send(true);
            debug!(conversation = %open.id, "conversation closed");
        }
    }

    /// Send a message to the other participant of the conversation. On any
    /// failure the trimmed text rides back in [`CoreError::Send`] so the UI
    /// can restore the input; nothing is queued for later.
    pub async fn send_message(&self, id: ConversationId, text: &str) -> Result<Message> {
        let me = self.inner.session.require_user()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("message text is required".into()));
        }

        let limit = self.inner.config.call_timeout;
        let conversation = call_with_timeout(limit, self.inner.store.conversation(id))
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("conversation {id}")))?;
        if !conversation.involves(me.id) {
            return Err(CoreError::Authorization(
                "not a participant in this conversation".into(),
            ));
        }
        let recipient = conversation
            .other_participant(me.id)
            .ok_or_else(|| CoreError::Validation("conversation has no other participant".into()))?;

        // Fail fast while disconnected; there is no offline queue.
        if !self.inner.transport.is_connected() {
            return Err(CoreError::Send {
                reason: TransportError::Disconnected.to_string(),
                text: trimmed.to_string(),
            });
        }

        let sent = call_with_timeout(
            limit,
            self.inner.transport.send_chat_message(id, recipient, trimmed),
        )
        .await
        .map_err(|e| CoreError::Send {
            reason: e.to_string(),
            text: trimmed.to_string(),
        })?;

        // Optimistic merge of the acknowledged message.
        let total = {
            let mut state = self.inner.state.lock();
            let cache = state.messages.entry(id).or_default();
            merge_messages(cache, [sent.clone()]);
            if let Some(view) = state.conversations.iter_mut().find(|v| v.conversation.id == id) {
                view.conversation.last_message_at = sent.sent_at;
                view.last_message = Some(sent.clone());
            }
            state.sort_conversations();
            state.total_unread()
        };
        let _ = self.inner.events.send(CoreEvent::MessagesChanged(id));
        let _ = self.inner.events.send(CoreEvent::ConversationListChanged);
        let _ = self.inner.events.send(CoreEvent::UnreadCountChanged(total));
        Ok(sent)
    }

    /// Look up or lazily create the conversation for a user pair. The pair is
    /// canonicalized, and uniqueness is enforced atomically by the store, so
    /// concurrent calls in either argument order yield the same conversation.
    pub async fn get_or_create_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Conversation> {
        if a == b {
            return Err(CoreError::Validation(
                "a conversation requires two distinct participants".into(),
            ));
        }
        let [first, second] = Conversation::canonical_pair(a, b);
        let conversation = call_with_timeout(
            self.inner.config.call_timeout,
            self.inner.store.create_or_get_conversation(first, second),
        )
        .await?;
        Ok(conversation)
    }

    /// Every conversation system-wide, enriched for the monitoring view.
    /// Admin only.
    pub async fn all_conversations(&self) -> Result<Vec<ConversationOverview>> {
        let me = self.inner.session.require_user()?;
        if !me.is_admin() {
            return Err(CoreError::Authorization(
                "only an administrator can view all conversations".into(),
            ));
        }

        let limit = self.inner.config.call_timeout;
        let conversations = call_with_timeout(limit, self.inner.store.all_conversations()).await?;
        let mut overviews = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let mut participants = Vec::with_capacity(2);
            for id in conversation.participants {
                if let Some(user) = call_with_timeout(limit, self.inner.store.user(id)).await? {
                    participants.push(Peer::from(&user));
                }
            }
            let messages =
                call_with_timeout(limit, self.inner.store.messages(conversation.id)).await?;
            overviews.push(ConversationOverview {
                conversation,
                last_message: messages.last().cloned(),
                message_count: messages.len(),
                participants,
            });
        }
        overviews.sort_by(|a, b| {
            b.activity_at()
                .cmp(&a.activity_at())
                .then_with(|| a.conversation.id.cmp(&b.conversation.id))
        });
        Ok(overviews)
    }

    /// Apply a pushed message through the same merge path the poll loop
    /// uses. Messages for the open conversation are acknowledged as read
    /// immediately, since the recipient is viewing it.
    pub async fn apply_push(&self, message: Message) -> Result<()> {
        let Some(me) = self.inner.session.current_user() else {
            return Ok(());
        };
        let conversation_id = message.conversation_id;
        let is_open =
            self.inner.state.lock().open.as_ref().map(|o| o.id) == Some(conversation_id);

        let mut message = message;
        if is_open && message.is_inbound_for(me.id) && !message.read {
            let ack = call_with_timeout(
                self.inner.config.call_timeout,
                self.inner.store.mark_messages_read(conversation_id, me.id),
            )
            .await;
            match ack {
                Ok(_) => message.read = true,
                Err(e) => warn!(conversation = %conversation_id, error = %e, "read acknowledgement failed"),
            }
        }

        let known_view = {
            let mut state = self.inner.state.lock();
            let cache = state.messages.entry(conversation_id).or_default();
            let changed = merge_messages(cache, [message.clone()]);
            if !changed {
                return Ok(());
            }
            match state.conversations.iter_mut().find(|v| v.conversation.id == conversation_id) {
                Some(view) => {
                    if message.sent_at >= view.activity_at() {
                        view.conversation.last_message_at = message.sent_at;
                        view.last_message = Some(message.clone());
                    }
                    if message.is_inbound_for(me.id) && !message.read {
                        view.unread_count += 1;
                    }
                    state.sort_conversations();
                    true
                }
                None => false,
            }
        };

        if known_view {
            let total = self.inner.state.lock().total_unread();
            let _ = self.inner.events.send(CoreEvent::MessagesChanged(conversation_id));
            let _ = self.inner.events.send(CoreEvent::ConversationListChanged);
            let _ = self.inner.events.send(CoreEvent::UnreadCountChanged(total));
        } else {
            // First contact in a conversation the list has never seen; a
            // full refresh resolves the peer profile and emits the events.
            self.list_conversations().await?;
            let _ = self.inner.events.send(CoreEvent::MessagesChanged(conversation_id));
        }
        Ok(())
    }

    /// Cached conversation list, in canonical order.
    pub fn conversations(&self) -> Vec<ConversationView> {
        self.inner.state.lock().conversations.clone()
    }

    /// Cached messages for a conversation, ascending by timestamp.
    pub fn messages(&self, id: ConversationId) -> Vec<Message> {
        self.inner.state.lock().messages.get(&id).cloned().unwrap_or_default()
    }

    pub fn open_conversation_id(&self) -> Option<ConversationId> {
        self.inner.state.lock().open.as_ref().map(|o| o.id)
    }

    fn spawn_poll_loop(&self, id: ConversationId, me: UserId, mut stop: watch::Receiver<bool>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.message_poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; history was just loaded.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        // Reads are retried by simply continuing the loop.
                        if let Err(e) = poll_once(&inner, id, me).await {
                            warn!(conversation = %id, error = %e, "message poll failed");
                        }
                    }
                }
            }
            debug!(conversation = %id, "poll loop stopped");
        });
    }
}

/// One poll iteration: fetch, acknowledge inbound deltas (the viewer has the
/// conversation open), and merge. Runs against the store regardless of
/// transport connectivity.
async fn poll_once(inner: &Arc<EngineInner>, id: ConversationId, me: UserId) -> Result<()> {
    let limit = inner.config.call_timeout;
    let mut fetched = call_with_timeout(limit, inner.store.messages(id)).await?;
    if fetched.iter().any(|m| m.is_inbound_for(me) && !m.read) {
        call_with_timeout(limit, inner.store.mark_messages_read(id, me)).await?;
        for m in &mut fetched {
            if m.is_inbound_for(me) {
                m.read = true;
            }
        }
    }

    let changed = {
        let mut guard = inner.state.lock();
        let state = &mut *guard;
        let cache = state.messages.entry(id).or_default();
        let changed = merge_messages(cache, fetched);
        if changed {
            let last = cache.last().cloned();
            if let Some(view) = state.conversations.iter_mut().find(|v| v.conversation.id == id) {
                if let Some(last) = last {
                    view.conversation.last_message_at = last.sent_at;
                    view.last_message = Some(last);
                }
            }
            state.sort_conversations();
        }
        changed
    };

    if changed {
        let _ = inner.events.send(CoreEvent::MessagesChanged(id));
        let _ = inner.events.send(CoreEvent::ConversationListChanged);
    }
    Ok(())
}
