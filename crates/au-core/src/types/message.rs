//! Frame envelopes exchanged over the push channel.
//!
//! Inbound frames:
//!
//! ```json
//! { "type": "price", "data": { ... }, "timestamp": 1700000000000 }
//! ```
//!
//! Outbound control frames use the same envelope with `type` set to
//! `subscribe`, `unsubscribe` or `ping`.

use serde::{Deserialize, Serialize};

use super::enums::{ControlKind, MessageTag};
use crate::error::SyncError;
use crate::time_util;

/// A parsed inbound frame. Created on receipt, consumed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub tag: MessageTag,
    /// Type-specific payload, decoded later by the handler bound to `tag`.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Server event time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl Message {
    /// Parse a raw text frame.
    ///
    /// Invalid JSON, a missing `type`, or an unknown `type` all map to
    /// [`SyncError::ProtocolViolation`].
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::ProtocolViolation(e.to_string()))
    }

    /// Event time used for last-write-wins ordering. Frames without a
    /// timestamp are stamped with local receive time.
    pub fn event_time_ms(&self) -> u64 {
        self.timestamp.unwrap_or_else(time_util::now_ms)
    }
}

/// A client-originated control frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlFrame {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    pub data: serde_json::Value,
    pub timestamp: u64,
}

impl ControlFrame {
    pub fn subscribe<S: AsRef<str>>(symbols: &[S]) -> Self {
        Self::with_symbols(ControlKind::Subscribe, symbols)
    }

    pub fn unsubscribe<S: AsRef<str>>(symbols: &[S]) -> Self {
        Self::with_symbols(ControlKind::Unsubscribe, symbols)
    }

    pub fn ping() -> Self {
        Self {
            kind: ControlKind::Ping,
            data: serde_json::json!({}),
            timestamp: time_util::now_ms(),
        }
    }

    fn with_symbols<S: AsRef<str>>(kind: ControlKind, symbols: &[S]) -> Self {
        let symbols: Vec<&str> = symbols.iter().map(AsRef::as_ref).collect();
        Self {
            kind,
            data: serde_json::json!({ "symbols": symbols }),
            timestamp: time_util::now_ms(),
        }
    }

    /// Symbols carried by a subscribe/unsubscribe frame (empty for ping).
    pub fn symbols(&self) -> Vec<String> {
        self.data
            .get("symbols")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_text(&self) -> String {
        // A struct of a unit enum, a `Value` and an integer cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}
