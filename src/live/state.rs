use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle state of the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or intentionally disconnected
    Idle,
    Connecting,
    Connected,
    Disconnected,
    /// Waiting on the backoff timer before the next attempt
    Reconnecting,
    /// Terminal: reconnect budget spent or the server closed cleanly
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Externally visible connection status, as rendered by a status indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Failed(String),
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One status emission
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: ConnectionStatus,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    pub fn now(status: ConnectionStatus) -> Self {
        Self {
            status,
            at: Utc::now(),
        }
    }
}
