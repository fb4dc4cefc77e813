//! Runtime assembly: wires the store, transport, session, presence tracker,
//! sync engine, and feed together, and owns the background workers that keep
//! them fed while a session is active.
//!
//! Workers started at login:
//!   - heartbeat: periodic activity write, 30s
//!   - roster poll: full presence refresh, 30s
//!   - inbound pump: dispatches transport pushes to the engine/feed/presence
//!   - reconnect supervisor: retries a dropped transport every 5s
//!
//! All of them watch a per-session shutdown signal and exit on logout.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::engine::SyncEngine;
use crate::error::{call_with_timeout, Result};
use crate::events::CoreEvent;
use crate::feed::Feed;
use crate::models::{User, UserId};
use crate::presence::PresenceTracker;
use crate::session::Session;
use crate::store::DataStore;
use crate::transport::{Transport, TransportEvent};

pub struct CoreRuntime {
    store: Arc<dyn DataStore>,
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    presence: Arc<PresenceTracker>,
    engine: SyncEngine,
    feed: Feed,
    events: broadcast::Sender<CoreEvent>,
    config: CoreConfig,
    /// Present only while a session is active; signalling it stops every
    /// worker spawned for that session.
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl CoreRuntime {
    pub fn new(store: Arc<dyn DataStore>, transport: Arc<dyn Transport>) -> Self {
        Self::with_config(store, transport, CoreConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn DataStore>,
        transport: Arc<dyn Transport>,
        config: CoreConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session = Arc::new(Session::new(store.clone(), config.clone()));
        let presence = Arc::new(PresenceTracker::new(
            store.clone(),
            events.clone(),
            config.clone(),
        ));
        let engine = SyncEngine::new(
            store.clone(),
            transport.clone(),
            session.clone(),
            events.clone(),
            config.clone(),
        );
        let feed = Feed::new(
            store.clone(),
            transport.clone(),
            session.clone(),
            events.clone(),
            config.clone(),
        );
        Self {
            store,
            transport,
            session,
            presence,
            engine,
            feed,
            events,
            config,
            shutdown: Mutex::new(None),
        }
    }

    /// Authenticate and bring the runtime up. A transport that cannot connect
    /// does not fail the login; the session runs degraded on store polls and
    /// the reconnect supervisor keeps retrying.
    pub async fn login(&self, email: &str, password: &str, remember: bool) -> Result<User> {
        let user = self.session.login(email, password, remember).await?;

        match call_with_timeout(self.config.call_timeout, self.transport.connect(user.id)).await {
            Ok(()) => info!(user = %user.id, "transport connected"),
            Err(e) => warn!(error = %e, "transport unavailable, continuing on store polls"),
        }
        // Roster refresh is an idempotent read; the 30s poll repairs a
        // failure, so it must not tear down the session just established.
        if let Err(e) = self.presence.refresh_roster().await {
            warn!(error = %e, "initial roster refresh failed");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown.lock() = Some(shutdown_tx);
        self.spawn_heartbeat(user.id, shutdown_rx.clone());
        self.spawn_roster_poll(shutdown_rx.clone());
        self.spawn_inbound_pump(shutdown_rx.clone());
        self.spawn_reconnect_supervisor(user.id, shutdown_rx);

        Ok(user)
    }

    /// Tear the session down. Every step past the shutdown signal is
    /// best-effort; logout never fails.
    pub async fn logout(&self) {
        let shutdown = self.shutdown.lock().take();
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }

        self.engine.close_conversation();
        if let Some(user) = self.session.current_user() {
            self.presence.set_offline(user.id).await;
        }
        self.transport.disconnect().await;
        self.feed.clear();
        self.session.logout().await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn store(&self) -> Arc<dyn DataStore> {
        self.store.clone()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    fn spawn_heartbeat(&self, me: UserId, mut stop: watch::Receiver<bool>) {
        let presence = self.presence.clone();
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = presence.heartbeat(me).await {
                            warn!(error = %e, "heartbeat failed");
                        }
                    }
                }
            }
            debug!("heartbeat stopped");
        });
    }

    fn spawn_roster_poll(&self, mut stop: watch::Receiver<bool>) {
        let presence = self.presence.clone();
        let interval = self.config.roster_poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = presence.refresh_roster().await {
                            warn!(error = %e, "roster poll failed");
                        }
                    }
                }
            }
            debug!("roster poll stopped");
        });
    }

    /// Forward transport pushes into the components that cache their state.
    /// A lagged receiver drops to the latest events; the poll loops repair
    /// whatever a lag skipped.
    fn spawn_inbound_pump(&self, mut stop: watch::Receiver<bool>) {
        let mut rx = self.transport.subscribe();
        let engine = self.engine.clone();
        let feed = self.feed.clone();
        let presence = self.presence.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    received = rx.recv() => match received {
                        Ok(TransportEvent::Message(message)) => {
                            if let Err(e) = engine.apply_push(message).await {
                                warn!(error = %e, "pushed message not applied");
                            }
                        }
                        Ok(TransportEvent::Notification(notification)) => {
                            feed.apply_push(notification);
                        }
                        Ok(TransportEvent::Presence { user_id, online }) => {
                            presence.apply_push(user_id, online);
                        }
                        Ok(TransportEvent::Connected) => {
                            let _ = events.send(CoreEvent::Connected);
                        }
                        Ok(TransportEvent::Disconnected) => {
                            let _ = events.send(CoreEvent::Disconnected);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "inbound pump lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            debug!("inbound pump stopped");
        });
    }

    /// Retry a dropped transport on a fixed cadence. Reconnecting announces
    /// presence again, so peers that saw the drop see the return.
    fn spawn_reconnect_supervisor(&self, me: UserId, mut stop: watch::Receiver<bool>) {
        let transport = self.transport.clone();
        let interval = self.config.reconnect_interval;
        let timeout = self.config.call_timeout;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        if transport.is_connected() {
                            continue;
                        }
                        match call_with_timeout(timeout, transport.connect(me)).await {
                            Ok(()) => info!("transport reconnected"),
                            Err(e) => debug!(error = %e, "reconnect attempt failed"),
                        }
                    }
                }
            }
            debug!("reconnect supervisor stopped");
        });
    }
}
