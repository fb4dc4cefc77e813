//! Write-through transport for tests and the demo binary. Sends are applied
//! to a shared [`DataStore`] and echoed back to every subscriber, mimicking a
//! broker that persists and fans out. An outage can be simulated with
//! [`LoopbackTransport::sever`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use super::{Transport, TransportEvent};
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::TransportError;
use crate::models::{ConversationId, Message, NewNotification, Notification, UserId};
use crate::store::DataStore;

pub struct LoopbackTransport {
    store: Arc<dyn DataStore>,
    connected_as: Mutex<Option<UserId>>,
    tx: broadcast::Sender<TransportEvent>,
}

impl LoopbackTransport {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            connected_as: Mutex::new(None),
            tx,
        }
    }

    /// Drop the link without announcing offline, as a network failure would.
    pub fn sever(&self) {
        let was = self.connected_as.lock().take();
        if was.is_some() {
            debug!("loopback transport severed");
            let _ = self.tx.send(TransportEvent::Disconnected);
        }
    }

    fn require_connection(&self) -> Result<UserId, TransportError> {
        self.connected_as.lock().ok_or(TransportError::Disconnected)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&self, user_id: UserId) -> Result<(), TransportError> {
        *self.connected_as.lock() = Some(user_id);
        // Presence is announced on every successful (re)connect.
        self.store
            .set_online(user_id, true)
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let _ = self.tx.send(TransportEvent::Presence { user_id, online: true });
        let _ = self.tx.send(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(user_id) = self.connected_as.lock().take() else {
            return;
        };
        let _ = self.store.set_online(user_id, false).await;
        let _ = self.tx.send(TransportEvent::Presence { user_id, online: false });
        let _ = self.tx.send(TransportEvent::Disconnected);
    }

    fn is_connected(&self) -> bool {
        self.connected_as.lock().is_some()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.tx.subscribe()
    }

    async fn send_chat_message(
        &self,
        conversation_id: ConversationId,
        _recipient_id: UserId,
        text: &str,
    ) -> Result<Message, TransportError> {
        let sender = self.require_connection()?;
        let message = self
            .store
            .append_message(conversation_id, sender, text)
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let _ = self.tx.send(TransportEvent::Message(message.clone()));
        Ok(message)
    }

    async fn send_notification(
        &self,
        sender_id: UserId,
        new: &NewNotification,
    ) -> Result<Notification, TransportError> {
        self.require_connection()?;
        let notification = self
            .store
            .append_notification(sender_id, new)
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let _ = self.tx.send(TransportEvent::Notification(notification.clone()));
        Ok(notification)
    }
}
