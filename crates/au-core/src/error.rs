//! Typed error definitions for the sync layer.
//!
//! [`SyncError`] mirrors the failure taxonomy of the channel: every variant is
//! non-fatal to the process and resolves to a state transition, a dropped
//! frame, or a logged skip. All variants implement `std::error::Error` via
//! `thiserror`, so they compose with `anyhow::Result` in the runner.

use thiserror::Error;

use crate::types::ConnectionState;

/// Domain-specific errors for the sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Connection drop, handshake failure, or socket error.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Inbound frame that is not valid JSON or carries an unknown `type`.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A frame with a known tag whose payload does not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Outbound frame attempted while the channel was not connected.
    #[error("send rejected while {state}")]
    SendRejected {
        /// Channel state at the time of the attempt.
        state: ConnectionState,
    },

    /// Reconnect attempts reached the configured cap.
    #[error("reconnect attempts exhausted after {0} tries")]
    RetriesExhausted(u32),

    /// A single polling tick failed (network, HTTP status, or `success: false`).
    #[error("poll failure: {0}")]
    PollFailure(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type SyncResult<T> = Result<T, SyncError>;
