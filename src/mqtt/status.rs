use chrono::{DateTime, Local};

/// Externally observable connection state.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Subscribed,
    Receiving,
}

/// Snapshot published by the connection supervisor on every state change.
#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub connection_state: ConnectionState,
    pub connect_attempts: u64,
    pub stalls: u64,
    pub failures: u64,
    pub messages_received: u64,
    pub last_activity: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}
