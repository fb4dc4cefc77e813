pub mod conversation;
pub mod message;
pub mod notification;
pub mod task;
pub mod user;

pub use conversation::{Conversation, ConversationId, ConversationOverview, ConversationView, Peer};
pub use message::{Message, MessageId};
pub use notification::{NewNotification, Notification, NotificationId, NotificationKind, Priority, Recipients};
pub use task::{NewTask, Task, TaskId};
pub use user::{Role, User, UserId};
