//! Presence tracking: reflects this client's activity to the system and
//! derives other users' online state from roster polls merged with pushes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::CoreConfig;
use crate::error::{call_with_timeout, Result};
use crate::events::CoreEvent;
use crate::models::UserId;
use crate::store::DataStore;
use crate::timefmt;

/// Interaction signals that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    PointerDown,
    KeyDown,
    Touch,
    Scroll,
}

#[derive(Debug, Clone, Copy, Default)]
struct PresenceEntry {
    online: bool,
    last_active: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct PresenceState {
    roster: HashMap<UserId, PresenceEntry>,
    last_activity_sent: Option<Instant>,
}

pub struct PresenceTracker {
    store: Arc<dyn DataStore>,
    events: broadcast::Sender<CoreEvent>,
    config: CoreConfig,
    state: Mutex<PresenceState>,
}

impl PresenceTracker {
    pub fn new(
        store: Arc<dyn DataStore>,
        events: broadcast::Sender<CoreEvent>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            events,
            config,
            state: Mutex::new(PresenceState::default()),
        }
    }

    /// Report an interaction signal. At most one store write leaves per
    /// debounce window, however fast the signals arrive. Returns whether a
    /// write was actually emitted.
    pub async fn record_activity(&self, me: UserId, signal: ActivitySignal) -> Result<bool> {
        {
            let mut state = self.state.lock();
            if let Some(sent) = state.last_activity_sent {
                if sent.elapsed() < self.config.activity_debounce {
                    return Ok(false);
                }
            }
            state.last_activity_sent = Some(Instant::now());
        }
        debug!(?signal, "activity signal");
        call_with_timeout(self.config.call_timeout, self.store.touch_activity(me)).await?;
        Ok(true)
    }

    /// The unconditional periodic heartbeat; not subject to the debounce.
    pub async fn heartbeat(&self, me: UserId) -> Result<()> {
        call_with_timeout(self.config.call_timeout, self.store.touch_activity(me)).await?;
        Ok(())
    }

    /// Merge a full roster poll into the presence map, emitting
    /// `PresenceChanged` only for users whose state actually changed.
    pub async fn refresh_roster(&self) -> Result<()> {
        let users = call_with_timeout(self.config.call_timeout, self.store.users()).await?;
        let mut changed = Vec::new();
        {
            let mut state = self.state.lock();
            for user in &users {
                let entry = state.roster.entry(user.id).or_default();
                if entry.online != user.is_online || entry.last_active != user.last_active {
                    entry.online = user.is_online;
                    entry.last_active = user.last_active;
                    changed.push(user.id);
                }
            }
        }
        for id in changed {
            let _ = self.events.send(CoreEvent::PresenceChanged(id));
        }
        Ok(())
    }

    /// Push-driven presence change; funnels into the same map the poll uses.
    pub fn apply_push(&self, user_id: UserId, online: bool) {
        let changed = {
            let mut state = self.state.lock();
            let entry = state.roster.entry(user_id).or_default();
            let changed = entry.online != online;
            entry.online = online;
            if !online && changed {
                entry.last_active = Some(Utc::now());
            }
            changed
        };
        if changed {
            let _ = self.events.send(CoreEvent::PresenceChanged(user_id));
        }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.state
            .lock()
            .roster
            .get(&user_id)
            .map(|e| e.online)
            .unwrap_or(false)
    }

    /// Status line for a user: "Online", "Last active N minutes ago", or
    /// plain "Offline" when nothing was ever observed.
    pub fn last_active_text(&self, user_id: UserId, now: DateTime<Utc>) -> String {
        let entry = self.state.lock().roster.get(&user_id).copied();
        match entry {
            Some(e) if e.online => "Online".to_string(),
            Some(PresenceEntry {
                last_active: Some(at),
                ..
            }) => format!("Last active {}", timefmt::relative_time(at, now)),
            _ => "Offline".to_string(),
        }
    }

    /// Advisory offline signal before teardown; unload paths may interrupt
    /// it, so delivery is not guaranteed.
    pub async fn set_offline(&self, me: UserId) {
        let _ = call_with_timeout(self.config.call_timeout, self.store.set_online(me, false)).await;
        self.apply_push(me, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EVENT_CHANNEL_CAPACITY;
    use crate::models::{Role, User};
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn tracker() -> (Arc<MemoryStore>, PresenceTracker) {
        let store = Arc::new(MemoryStore::new());
        store.add_user(
            User {
                id: UserId(2),
                email: "dev@opsdesk.test".into(),
                name: "Dev".into(),
                avatar: String::new(),
                role: Role::Frontend,
                is_online: false,
                last_active: None,
                last_login: None,
                unread_messages: 0,
            },
            "pw",
        );
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let tracker = PresenceTracker::new(store.clone(), tx, CoreConfig::default());
        (store, tracker)
    }

    #[tokio::test]
    async fn activity_is_debounced_to_one_write_per_window() {
        let (_, tracker) = tracker();
        assert!(tracker.record_activity(UserId(2), ActivitySignal::KeyDown).await.unwrap());
        assert!(!tracker.record_activity(UserId(2), ActivitySignal::Scroll).await.unwrap());
        assert!(!tracker.record_activity(UserId(2), ActivitySignal::PointerDown).await.unwrap());
    }

    #[tokio::test]
    async fn roster_refresh_tracks_store_state() {
        let (store, tracker) = tracker();
        tracker.refresh_roster().await.unwrap();
        assert!(!tracker.is_online(UserId(2)));

        store.set_online(UserId(2), true).await.unwrap();
        tracker.refresh_roster().await.unwrap();
        assert!(tracker.is_online(UserId(2)));
    }

    #[tokio::test]
    async fn push_overrides_between_polls() {
        let (_, tracker) = tracker();
        tracker.apply_push(UserId(2), true);
        assert!(tracker.is_online(UserId(2)));
        tracker.apply_push(UserId(2), false);
        assert!(!tracker.is_online(UserId(2)));
    }

    #[tokio::test]
    async fn status_text_variants() {
        let (_, tracker) = tracker();
        let now = Utc::now();
        assert_eq!(tracker.last_active_text(UserId(2), now), "Offline");

        tracker.apply_push(UserId(2), true);
        assert_eq!(tracker.last_active_text(UserId(2), now), "Online");

        tracker.apply_push(UserId(2), false);
        let text = tracker.last_active_text(UserId(2), now + Duration::minutes(5));
        assert_eq!(text, "Last active 5 minutes ago");
    }
}
