//! # au-core
//!
//! Core crate for the Aurum market dashboard sync layer, providing:
//!
//! - **Types** (`types`) — connection state, message tags, frame envelopes, market snapshots
//! - **Configuration** (`config`) — JSON config deserialization and validation
//! - **Error types** (`error`) — domain-specific `SyncError` via thiserror
//! - **WebSocket** (`ws`) — `Connector`/`Link` transport traits and the tungstenite link
//! - **Time utilities** (`time_util`) — epoch-millisecond clock and timestamp parsing
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
