//! Market data snapshots held by the state store.
//!
//! Every snapshot is immutable once built: the store replaces it wholesale on
//! each accepted update and never patches individual fields.
//!
//! # Timestamp convention
//!
//! `received_at` is the event time in **milliseconds since Unix epoch**, taken
//! from the frame envelope for push updates and from the REST payload (or
//! local receive time) for polled updates.

use serde::Serialize;

use super::enums::TradeSide;

/// Anything the store orders by event time.
pub trait Timestamped {
    fn received_at(&self) -> u64;
}

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// Latest price for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_pct: f64,
    pub volume: Option<f64>,
    pub received_at: u64,
}

impl Timestamped for PriceSnapshot {
    fn received_at(&self) -> u64 {
        self.received_at
    }
}

impl std::fmt::Display for PriceSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Price({} {:.2} {:+.2} {:+.2}% t={})",
            self.symbol, self.price, self.change, self.change_pct, self.received_at
        )
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// One price level with its running cumulative volume from the top of book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderLevel {
    pub price: f64,
    pub volume: f64,
    pub cumulative_volume: f64,
}

/// Full order book for one symbol.
///
/// Bids are sorted **descending** by price (best bid first), asks
/// **ascending** (best ask first). Cumulative volumes are derived from the raw
/// `(price, volume)` pairs in [`OrderBookSnapshot::new`]; best bid/ask, spread
/// and totals are computed from the levels on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    pub bids: Vec<OrderLevel>,
    pub asks: Vec<OrderLevel>,
    pub received_at: u64,
}

impl OrderBookSnapshot {
    /// Build a snapshot from raw `(price, volume)` pairs in any order.
    pub fn new(
        symbol: impl Into<String>,
        bids: &[(f64, f64)],
        asks: &[(f64, f64)],
        received_at: u64,
    ) -> Self {
        let mut bids = bids.to_vec();
        bids.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut asks = asks.to_vec();
        asks.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Self {
            symbol: symbol.into(),
            bids: accumulate(&bids),
            asks: accumulate(&asks),
            received_at,
        }
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// `best_ask - best_bid`, or `None` if either side is empty.
    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    pub fn total_bid_volume(&self) -> f64 {
        self.bids.last().map(|l| l.cumulative_volume).unwrap_or(0.0)
    }

    pub fn total_ask_volume(&self) -> f64 {
        self.asks.last().map(|l| l.cumulative_volume).unwrap_or(0.0)
    }

    /// Total bid volume over total ask volume, `None` when there are no asks.
    pub fn bid_ask_ratio(&self) -> Option<f64> {
        let asks = self.total_ask_volume();
        (asks > 0.0).then(|| self.total_bid_volume() / asks)
    }
}

impl Timestamped for OrderBookSnapshot {
    fn received_at(&self) -> u64 {
        self.received_at
    }
}

fn accumulate(levels: &[(f64, f64)]) -> Vec<OrderLevel> {
    let mut running = 0.0;
    levels
        .iter()
        .map(|&(price, volume)| {
            running += volume;
            OrderLevel { price, volume, cumulative_volume: running }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Market depth ladder
// ---------------------------------------------------------------------------

/// One rung of the depth chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepthLevel {
    pub price: f64,
    pub bid_volume: f64,
    pub ask_volume: f64,
}

/// Depth-chart ladder for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub levels: Vec<DepthLevel>,
    pub received_at: u64,
}

impl Timestamped for DepthSnapshot {
    fn received_at(&self) -> u64 {
        self.received_at
    }
}

// ---------------------------------------------------------------------------
// Trades and news
// ---------------------------------------------------------------------------

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeTick {
    pub symbol: String,
    pub price: f64,
    pub amount: f64,
    pub side: TradeSide,
    /// Exchange-formatted trade time (e.g. `"14:03:27"`).
    pub trade_time: String,
    pub received_at: u64,
}

/// A news or notice item pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub title: Option<String>,
    pub body: serde_json::Value,
    pub received_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_book_sorts_and_accumulates() {
        let book = OrderBookSnapshot::new(
            "PAXGUSDT",
            &[(99.0, 2.0), (100.0, 1.0), (98.0, 3.0)],
            &[(102.0, 4.0), (101.0, 5.0)],
            7,
        );
        let bid_prices: Vec<f64> = book.bids.iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![100.0, 99.0, 98.0]);
        let bid_cum: Vec<f64> = book.bids.iter().map(|l| l.cumulative_volume).collect();
        assert_eq!(bid_cum, vec![1.0, 3.0, 6.0]);
        assert_eq!(book.asks[0].price, 101.0);
        assert_eq!(book.asks[1].cumulative_volume, 9.0);
    }

    #[test]
    fn derived_metrics() {
        let book = OrderBookSnapshot::new("X", &[(100.0, 6.0)], &[(100.5, 3.0)], 0);
        assert_eq!(book.best_bid(), Some(100.0));
        assert_eq!(book.best_ask(), Some(100.5));
        assert_eq!(book.spread(), Some(0.5));
        assert_eq!(book.bid_ask_ratio(), Some(2.0));
    }

    #[test]
    fn empty_book_has_no_spread() {
        let book = OrderBookSnapshot::new("X", &[(100.0, 1.0)], &[], 0);
        assert_eq!(book.spread(), None);
        assert_eq!(book.total_ask_volume(), 0.0);
        assert_eq!(book.bid_ask_ratio(), None);
    }
}
