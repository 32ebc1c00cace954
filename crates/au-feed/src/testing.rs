//! In-memory collaborators for driving the channel and the poller without a
//! network: a [`MemoryConnector`] whose links record outbound frames and let
//! the caller inject link events, and a scripted [`MemoryPriceSource`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use au_core::error::SyncError;
use au_core::ws::{Connector, Link, LinkEvent, OnLinkEvent};
use parking_lot::Mutex;

use crate::connection::{ConnectionManager, EventReceiver};
use crate::rest::PriceSource;
use crate::wire::{MarketDepthResponse, PriceResponse, RestLevel};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    callbacks: Vec<OnLinkEvent>,
    sent: Vec<String>,
    closed: usize,
    fail_next_open: bool,
}

/// Connector whose links live in memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail synchronously.
    pub fn fail_next_open(&self) {
        self.shared.lock().fail_next_open = true;
    }

    /// Report `event` on the most recently opened link.
    pub fn emit(&self, event: LinkEvent) {
        let callback = self.shared.lock().callbacks.last().cloned();
        if let Some(cb) = callback {
            cb(event);
        }
    }

    /// Number of links opened successfully.
    pub fn opens(&self) -> usize {
        self.shared.lock().callbacks.len()
    }

    /// Number of `close()` calls across all links.
    pub fn closed_links(&self) -> usize {
        self.shared.lock().closed
    }

    /// Every frame sent so far, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.shared.lock().sent.clone()
    }

    /// Sent frames parsed as JSON.
    pub fn sent_frames(&self) -> Vec<serde_json::Value> {
        self.sent().iter().filter_map(|s| serde_json::from_str(s).ok()).collect()
    }

    pub fn clear_sent(&self) {
        self.shared.lock().sent.clear();
    }
}

impl Connector for MemoryConnector {
    type Link = MemoryLink;

    fn open(&mut self, url: &str, on_event: OnLinkEvent) -> Result<MemoryLink, SyncError> {
        let mut shared = self.shared.lock();
        if std::mem::take(&mut shared.fail_next_open) {
            return Err(SyncError::TransportFailure(format!("refused: {url}")));
        }
        shared.callbacks.push(on_event);
        Ok(MemoryLink { shared: self.shared.clone(), closed: false })
    }
}

pub struct MemoryLink {
    shared: Arc<Mutex<Shared>>,
    closed: bool,
}

impl Link for MemoryLink {
    fn send(&self, text: String) -> Result<(), SyncError> {
        if self.closed {
            return Err(SyncError::TransportFailure("link closed".into()));
        }
        self.shared.lock().sent.push(text);
        Ok(())
    }

    fn close(&mut self) {
        if !std::mem::replace(&mut self.closed, true) {
            self.shared.lock().closed += 1;
        }
    }
}

/// Feed every queued event to the manager without waiting.
pub fn pump<C: Connector>(manager: &mut ConnectionManager<C>, events: &mut EventReceiver) {
    while let Ok(event) = events.try_recv() {
        manager.handle_event(event);
    }
}

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

/// Price source that replays queued responses; `None` entries fail. Market
/// depth always returns a fixed two-level book.
#[derive(Default)]
pub struct MemoryPriceSource {
    prices: Mutex<VecDeque<Option<PriceResponse>>>,
    price_calls: AtomicUsize,
    latency: Duration,
}

impl MemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_price(&self, response: Option<PriceResponse>) {
        self.prices.lock().push_back(response);
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    /// A successful price response refreshed at `refresh_ms`.
    pub fn price(current_price: f64, refresh_ms: u64) -> PriceResponse {
        PriceResponse {
            success: true,
            current_price,
            price_change: 0.0,
            price_change_pct: 0.0,
            price_refresh_time: Some(serde_json::Value::from(refresh_ms)),
        }
    }
}

#[async_trait]
impl PriceSource for MemoryPriceSource {
    async fn fetch_price(&self) -> Result<PriceResponse, SyncError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.prices
            .lock()
            .pop_front()
            .flatten()
            .ok_or_else(|| SyncError::PollFailure("no scripted price".into()))
    }

    async fn fetch_market_depth(&self, _symbol: &str, _limit: u32) -> Result<MarketDepthResponse, SyncError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(MarketDepthResponse {
            bids: vec![RestLevel { price: 2649.0, volume: 1.0 }, RestLevel { price: 2648.0, volume: 2.0 }],
            asks: vec![RestLevel { price: 2651.0, volume: 1.0 }, RestLevel { price: 2652.0, volume: 1.5 }],
            current_price: Some(2650.0),
            symbol: None,
            is_simulated: true,
        })
    }
}
