//! Enumerations used throughout the sync layer.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a push channel.
///
/// Legal transitions:
///
/// ```text
/// Idle ──► Connecting ──► Connected
///              │    ▲          │
///              ▼    │          ▼
///           Disconnected ◄─────┘
///              │    ▲
///              ▼    │ disconnect()
///            Failed ─┘
///              │ connect()
///              └──────► Connecting
/// ```
///
/// `disconnect()` may move any state to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Idle | Disconnected | Failed, Connecting) => true,
            (Connecting, Connected) => true,
            (Disconnected, Failed) => true,
            (Idle | Connecting | Connected | Failed, Disconnected) => true,
            _ => false,
        }
    }

    /// `connect()` is a no-op in these states.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Message tags
// ---------------------------------------------------------------------------

/// The `type` field of an inbound frame envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTag {
    Price,
    Orderbook,
    MarketDepth,
    Trade,
    News,
    Heartbeat,
}

impl MessageTag {
    pub const ALL: [MessageTag; 6] = [
        MessageTag::Price,
        MessageTag::Orderbook,
        MessageTag::MarketDepth,
        MessageTag::Trade,
        MessageTag::News,
        MessageTag::Heartbeat,
    ];

    /// Wire name of the tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Orderbook => "orderbook",
            Self::MarketDepth => "market_depth",
            Self::Trade => "trade",
            Self::News => "news",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl std::fmt::Display for MessageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `type` field of a client-originated control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Subscribe,
    Unsubscribe,
    Ping,
}

// ---------------------------------------------------------------------------
// Trade side
// ---------------------------------------------------------------------------

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn lifecycle_edges() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Disconnected.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Connecting));
    }

    #[test]
    fn connected_never_jumps_to_connected() {
        assert!(!Connected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Idle.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Failed));
    }

    #[test]
    fn message_tag_wire_names() {
        let tag: MessageTag = serde_json::from_str("\"market_depth\"").unwrap();
        assert_eq!(tag, MessageTag::MarketDepth);
        assert_eq!(MessageTag::Orderbook.as_str(), "orderbook");
        assert!(serde_json::from_str::<MessageTag>("\"candles\"").is_err());
    }
}
