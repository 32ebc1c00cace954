//! Push-channel transport.
//!
//! A [`Connector`] opens one [`Link`] per connection attempt. A link never
//! reconnects by itself: it reports its lifecycle through a callback and the
//! owner decides what happens next.
//!
//! Event contract for a link returned by [`Connector::open`]:
//!
//! ```text
//! Opened? ──► Text* ──► (Error | Closed)
//! ```
//!
//! At most one terminal event is emitted. After [`Link::close`] the link may
//! stay silent.

pub mod client;

use std::sync::Arc;

use crate::error::SyncError;

pub use client::{WsConnector, WsLink};

/// Lifecycle and data events reported by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake completed.
    Opened,
    /// One inbound text frame.
    Text(String),
    /// Handshake, read or write failure. Terminal.
    Error(String),
    /// Remote close or end of stream, with the close reason if any. Terminal.
    Closed(Option<String>),
}

/// Callback invoked for every [`LinkEvent`] of one link.
pub type OnLinkEvent = Arc<dyn Fn(LinkEvent) + Send + Sync>;

/// One live transport connection.
pub trait Link: Send {
    /// Queue a text frame for sending.
    fn send(&self, text: String) -> Result<(), SyncError>;
    /// Close the connection. Idempotent.
    fn close(&mut self);
}

/// Factory for links. Opening returns immediately; the handshake outcome is
/// reported through `on_event`.
pub trait Connector: Send {
    type Link: Link;

    fn open(&mut self, url: &str, on_event: OnLinkEvent) -> Result<Self::Link, SyncError>;
}
