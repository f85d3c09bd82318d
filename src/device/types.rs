use std::fmt;

/// Externally visible phase of the connection supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Scanning,
    Connecting,
    Subscribed,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ConnectionState::Scanning => "Scanning",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Subscribed => "Subscribed",
            ConnectionState::Disconnected => "Disconnected",
        };

        write!(f, "{}", result)
    }
}
