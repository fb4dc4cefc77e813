pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod feed;
mod merge;
pub mod models;
pub mod presence;
pub mod runtime;
pub mod session;
pub mod store;
#[cfg(test)]
mod testutil;
pub mod timefmt;
pub mod transport;

pub use config::CoreConfig;
pub use engine::SyncEngine;
pub use error::{CoreError, Result, StoreError, TransportError};
pub use events::CoreEvent;
pub use feed::Feed;
pub use presence::{ActivitySignal, PresenceTracker};
pub use runtime::CoreRuntime;
pub use session::Session;
pub use store::{DataStore, MemoryStore};
pub use transport::{LoopbackTransport, Transport, TransportEvent};
