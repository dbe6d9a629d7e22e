//! Public types for the client connection manager.

use std::time::Duration;

use relaychat_protocol::constants::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY};

/// Connection state toward the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to be.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    Connected,
    /// Waiting out the delay after `attempt` consecutive failures.
    Reconnecting { attempt: u32 },
    /// Attempts exhausted. Only an explicit connect leaves this state.
    Failed,
}

impl ConnectionState {
    /// Returns `true` while the manager is working on a connection.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Events emitted by the connection manager, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// One raw inbound frame.
    Message(String),
}

/// Reconnection policy: a fixed delay between a bounded number of
/// consecutive attempts.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the attempt following `failures` consecutive failures.
    pub fn delay_for_attempt(&self, _failures: u32) -> Duration {
        self.delay
    }

    /// Returns `true` once `failures` has reached the cap.
    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}
