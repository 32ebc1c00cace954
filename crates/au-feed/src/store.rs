//! Shared market state with last-write-wins reconciliation.
//!
//! Push handlers and the polling coordinator write here independently and in
//! arbitrary interleavings. The authoritative value per symbol is decided by
//! event time, never by arrival order:
//!
//! - an incoming snapshot with `received_at >= stored.received_at` replaces
//!   the stored one wholesale (ties favor the incoming write);
//! - a strictly older snapshot is rejected.
//!
//! Readers receive clones, so a snapshot can never be observed half-written.

use std::collections::VecDeque;

use ahash::AHashMap;
use au_core::config::StoreConfig;
use au_core::types::*;
use parking_lot::RwLock;
use tracing::debug;

#[derive(Default)]
struct Inner {
    prices: AHashMap<String, PriceSnapshot>,
    books: AHashMap<String, OrderBookSnapshot>,
    depths: AHashMap<String, DepthSnapshot>,
    trades: AHashMap<String, VecDeque<TradeTick>>,
    news: VecDeque<NewsItem>,
}

/// Per-symbol market state. Wrap in `Arc` to share between writers.
pub struct StateStore {
    inner: RwLock<Inner>,
    trade_cap: usize,
    news_cap: usize,
}

impl StateStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            trade_cap: config.recent_trades.max(1),
            news_cap: config.recent_news.max(1),
        }
    }

    /// Apply a price update. Returns `true` if it was accepted.
    pub fn apply_price(&self, symbol: &str, snapshot: PriceSnapshot) -> bool {
        apply_lww(&mut self.inner.write().prices, symbol, snapshot, "price")
    }

    /// Apply an order book update. Returns `true` if it was accepted.
    pub fn apply_order_book(&self, symbol: &str, snapshot: OrderBookSnapshot) -> bool {
        apply_lww(&mut self.inner.write().books, symbol, snapshot, "orderbook")
    }

    /// Apply a depth ladder update. Returns `true` if it was accepted.
    pub fn apply_depth(&self, symbol: &str, snapshot: DepthSnapshot) -> bool {
        apply_lww(&mut self.inner.write().depths, symbol, snapshot, "market_depth")
    }

    /// Append a trade to the symbol's bounded history, evicting the oldest.
    pub fn push_trade(&self, tick: TradeTick) {
        let mut inner = self.inner.write();
        let buf = inner.trades.entry(tick.symbol.clone()).or_default();
        if buf.len() == self.trade_cap {
            buf.pop_front();
        }
        buf.push_back(tick);
    }

    /// Append a news item to the bounded history, evicting the oldest.
    pub fn push_news(&self, item: NewsItem) {
        let mut inner = self.inner.write();
        if inner.news.len() == self.news_cap {
            inner.news.pop_front();
        }
        inner.news.push_back(item);
    }

    pub fn price(&self, symbol: &str) -> Option<PriceSnapshot> {
        self.inner.read().prices.get(symbol).cloned()
    }

    pub fn order_book(&self, symbol: &str) -> Option<OrderBookSnapshot> {
        self.inner.read().books.get(symbol).cloned()
    }

    pub fn depth(&self, symbol: &str) -> Option<DepthSnapshot> {
        self.inner.read().depths.get(symbol).cloned()
    }

    /// All current prices, sorted by symbol.
    pub fn prices(&self) -> Vec<PriceSnapshot> {
        let mut all: Vec<PriceSnapshot> = self.inner.read().prices.values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    /// Recent trades for a symbol, oldest first.
    pub fn recent_trades(&self, symbol: &str) -> Vec<TradeTick> {
        self.inner
            .read()
            .trades
            .get(symbol)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Recent news, oldest first.
    pub fn recent_news(&self) -> Vec<NewsItem> {
        self.inner.read().news.iter().cloned().collect()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

fn apply_lww<T: Timestamped>(
    map: &mut AHashMap<String, T>,
    symbol: &str,
    snapshot: T,
    kind: &str,
) -> bool {
    match map.get(symbol) {
        Some(current) if snapshot.received_at() < current.received_at() => {
            debug!(
                "[store] rejected stale {kind} for {symbol}: t={} < t={}",
                snapshot.received_at(),
                current.received_at()
            );
            false
        }
        _ => {
            map.insert(symbol.to_string(), snapshot);
            true
        }
    }
}
