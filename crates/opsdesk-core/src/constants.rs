//! Application-wide constants
//!
//! Centralized location for the timing values used across multiple modules.

use std::time::Duration;

/// Re-fetch interval for the open conversation's message poll loop.
pub const MESSAGE_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Full-roster presence poll interval.
pub const ROSTER_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Unconditional activity heartbeat while a session is alive.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// At most one "active" signal per window, regardless of interaction rate.
pub const ACTIVITY_DEBOUNCE: Duration = Duration::from_secs(5);

/// Fixed retry interval while the transport is disconnected.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Bound on collaborator calls; a hang becomes a reported timeout error.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the core event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
