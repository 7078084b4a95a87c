/// State of the push connection as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Reconnecting {
        attempt: u32,
    },
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Connecting => "PUSH_CONNECTING",
            Self::Connected => "PUSH_CONNECTED",
            Self::Reconnecting { .. } => "PUSH_RECONNECTING",
            Self::Disconnected => "PUSH_DISCONNECTED",
        }
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether the inbox should show the persistent "connection lost" banner.
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Reconnecting { .. } | Self::Disconnected)
    }
}
