use std::time::Duration;

use crate::constants;

/// Timing knobs for the core. Defaults match the production intervals;
/// tests shrink them to keep poll loops fast.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub message_poll_interval: Duration,
    pub roster_poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub activity_debounce: Duration,
    pub reconnect_interval: Duration,
    pub call_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            message_poll_interval: constants::MESSAGE_POLL_INTERVAL,
            roster_poll_interval: constants::ROSTER_POLL_INTERVAL,
            heartbeat_interval: constants::HEARTBEAT_INTERVAL,
            activity_debounce: constants::ACTIVITY_DEBOUNCE,
            reconnect_interval: constants::RECONNECT_INTERVAL,
            call_timeout: constants::CALL_TIMEOUT,
        }
    }
}
