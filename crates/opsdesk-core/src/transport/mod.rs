pub mod loopback;

pub use loopback::LoopbackTransport;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::models::{ConversationId, Message, NewNotification, Notification, UserId};

/// Push payloads and connectivity changes arriving from the channel.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(Message),
    Notification(Notification),
    Presence { user_id: UserId, online: bool },
    Connected,
    Disconnected,
}

/// The real-time collaborator: request/response sends plus a subscription
/// stream of inbound pushes. The wire protocol behind it is assumed given.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, user_id: UserId) -> Result<(), TransportError>;
    async fn disconnect(&self);
    fn is_connected(&self) -> bool;

    /// Inbound events. Every subscriber sees every event; slow consumers may
    /// observe lag, and the poll loops repair anything a lag skipped.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Dispatch a chat message; the returned value is the acknowledged,
    /// stored message, so caches can merge by its authoritative id.
    async fn send_chat_message(
        &self,
        conversation_id: ConversationId,
        recipient_id: UserId,
        text: &str,
    ) -> Result<Message, TransportError>;

    async fn send_notification(
        &self,
        sender_id: UserId,
        new: &NewNotification,
    ) -> Result<Notification, TransportError>;
}
