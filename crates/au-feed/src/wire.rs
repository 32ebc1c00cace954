//! Wire payloads of the push channel and the REST collaborator, and their
//! conversion into store snapshots.

use au_core::error::SyncError;
use au_core::time_util;
use au_core::types::*;
use serde::Deserialize;

use crate::json_util::{de_f64, de_opt_f64};

// ---------------------------------------------------------------------------
// Push payloads (the `data` field of an envelope)
// ---------------------------------------------------------------------------

/// `price` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PricePayload {
    pub symbol: String,
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub change: f64,
    #[serde(rename = "changePercent", alias = "change_pct", default, deserialize_with = "de_f64")]
    pub change_percent: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub volume: Option<f64>,
}

impl PricePayload {
    pub fn into_snapshot(self, received_at: u64) -> PriceSnapshot {
        PriceSnapshot {
            symbol: self.symbol,
            price: self.price,
            change: self.change,
            change_pct: self.change_percent,
            volume: self.volume,
            received_at,
        }
    }
}

/// One order book level as pushed. The server's running `total` is ignored;
/// cumulative volume is always recomputed locally.
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevelPayload {
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(alias = "volume", deserialize_with = "de_f64")]
    pub amount: f64,
}

/// `orderbook` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookPayload {
    pub symbol: String,
    #[serde(default)]
    pub bids: Vec<BookLevelPayload>,
    #[serde(default)]
    pub asks: Vec<BookLevelPayload>,
}

impl OrderBookPayload {
    pub fn into_snapshot(self, received_at: u64) -> OrderBookSnapshot {
        let bids: Vec<(f64, f64)> = self.bids.iter().map(|l| (l.price, l.amount)).collect();
        let asks: Vec<(f64, f64)> = self.asks.iter().map(|l| (l.price, l.amount)).collect();
        OrderBookSnapshot::new(self.symbol, &bids, &asks, received_at)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepthRowPayload {
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(rename = "bidVolume", default, deserialize_with = "de_f64")]
    pub bid_volume: f64,
    #[serde(rename = "askVolume", default, deserialize_with = "de_f64")]
    pub ask_volume: f64,
}

/// `market_depth` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketDepthPayload {
    pub symbol: String,
    #[serde(default)]
    pub data: Vec<DepthRowPayload>,
}

impl MarketDepthPayload {
    pub fn into_snapshot(self, received_at: u64) -> DepthSnapshot {
        DepthSnapshot {
            symbol: self.symbol,
            levels: self
                .data
                .into_iter()
                .map(|r| DepthLevel { price: r.price, bid_volume: r.bid_volume, ask_volume: r.ask_volume })
                .collect(),
            received_at,
        }
    }
}

/// `trade` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TradePayload {
    pub symbol: String,
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(deserialize_with = "de_f64")]
    pub amount: f64,
    #[serde(rename = "type")]
    pub side: TradeSide,
    /// `"HH:MM:SS"` from the dashboard backend, epoch millis from others.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

impl TradePayload {
    pub fn into_tick(self, received_at: u64) -> TradeTick {
        let trade_time = match self.timestamp {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        TradeTick {
            symbol: self.symbol,
            price: self.price,
            amount: self.amount,
            side: self.side,
            trade_time,
            received_at,
        }
    }
}

/// Build a [`NewsItem`] from a `news` payload of any shape.
pub fn news_item(data: serde_json::Value, received_at: u64) -> NewsItem {
    let title = data.get("title").and_then(|t| t.as_str()).map(str::to_string);
    NewsItem { title, body: data, received_at }
}

// ---------------------------------------------------------------------------
// REST responses
// ---------------------------------------------------------------------------

/// `GET /price` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    pub success: bool,
    #[serde(deserialize_with = "de_f64")]
    pub current_price: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub price_change: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub price_change_pct: f64,
    /// ISO-8601 string or epoch milliseconds.
    #[serde(default)]
    pub price_refresh_time: Option<serde_json::Value>,
}

impl PriceResponse {
    /// Convert into a snapshot stored under `symbol`.
    ///
    /// `success: false` is a poll failure; the zeroed payload the backend
    /// sends in that case must never reach the store. `price_refresh_time` is
    /// trusted only as epoch millis or RFC 3339 with an offset; anything else
    /// (the backend's naive local time included) is stamped on receipt.
    pub fn into_snapshot(self, symbol: &str) -> Result<PriceSnapshot, SyncError> {
        if !self.success {
            return Err(SyncError::PollFailure("price endpoint reported success=false".into()));
        }
        let received_at = self
            .price_refresh_time
            .as_ref()
            .and_then(|v| match v {
                serde_json::Value::String(s) => time_util::parse_timestamp_ms(s),
                other => other.as_u64(),
            })
            .unwrap_or_else(time_util::now_ms);

        Ok(PriceSnapshot {
            symbol: symbol.to_string(),
            price: self.current_price,
            change: self.price_change,
            change_pct: self.price_change_pct,
            volume: None,
            received_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestLevel {
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(deserialize_with = "de_f64")]
    pub volume: f64,
}

/// `GET /market-depth` response. Server-side summary fields are not trusted;
/// derived metrics come from the levels.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketDepthResponse {
    #[serde(default)]
    pub bids: Vec<RestLevel>,
    #[serde(default)]
    pub asks: Vec<RestLevel>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub is_simulated: bool,
}

impl MarketDepthResponse {
    /// Convert into an order book and a depth ladder. Ladder rows pair the
    /// i-th bid with the i-th ask volume.
    pub fn into_snapshots(
        self,
        requested_symbol: &str,
        received_at: u64,
    ) -> (OrderBookSnapshot, DepthSnapshot) {
        let symbol = self.symbol.unwrap_or_else(|| requested_symbol.to_string());

        let bids: Vec<(f64, f64)> = self.bids.iter().map(|l| (l.price, l.volume)).collect();
        let asks: Vec<(f64, f64)> = self.asks.iter().map(|l| (l.price, l.volume)).collect();
        let book = OrderBookSnapshot::new(symbol.clone(), &bids, &asks, received_at);

        let levels = self
            .bids
            .iter()
            .enumerate()
            .map(|(i, bid)| DepthLevel {
                price: bid.price,
                bid_volume: bid.volume,
                ask_volume: self.asks.get(i).map(|a| a.volume).unwrap_or(0.0),
            })
            .collect();

        (book, DepthSnapshot { symbol, levels, received_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn price_payload_accepts_string_numbers() {
        let p: PricePayload = serde_json::from_value(json!({
            "symbol": "AU9999", "price": "580.5", "change": -1.2, "changePercent": -0.21, "volume": 4200
        }))
        .unwrap();
        let snap = p.into_snapshot(9);
        assert_eq!(snap.price, 580.5);
        assert_eq!(snap.change_pct, -0.21);
        assert_eq!(snap.volume, Some(4200.0));
        assert_eq!(snap.received_at, 9);
    }

    #[test]
    fn orderbook_payload_recomputes_totals() {
        let p: OrderBookPayload = serde_json::from_value(json!({
            "symbol": "AU9999",
            "bids": [{"price": 580.0, "amount": 100, "total": 999}, {"price": 579.5, "amount": 50, "total": 1}],
            "asks": [{"price": 581.0, "amount": 10, "total": 10}]
        }))
        .unwrap();
        let book = p.into_snapshot(1);
        assert_eq!(book.bids[1].cumulative_volume, 150.0);
        assert_eq!(book.spread(), Some(1.0));
    }

    #[test]
    fn trade_payload_keeps_clock_time() {
        let t: TradePayload = serde_json::from_value(json!({
            "symbol": "XAU/USD", "price": 2350.1, "amount": 12, "type": "sell", "timestamp": "14:03:27"
        }))
        .unwrap();
        let tick = t.into_tick(5);
        assert_eq!(tick.side, TradeSide::Sell);
        assert_eq!(tick.trade_time, "14:03:27");
    }

    #[test]
    fn price_response_success_false_is_poll_failure() {
        let r: PriceResponse = serde_json::from_value(json!({
            "success": false, "current_price": 0, "price_change": 0, "price_change_pct": 0,
            "price_refresh_time": "2026-01-05T10:00:00"
        }))
        .unwrap();
        assert!(matches!(r.into_snapshot("XAU/USD"), Err(SyncError::PollFailure(_))));
    }

    #[test]
    fn price_response_uses_refresh_time_with_offset() {
        let r: PriceResponse = serde_json::from_value(json!({
            "success": true, "current_price": 2351.2, "price_change": 3.1, "price_change_pct": 0.13,
            "price_refresh_time": "1970-01-01T08:00:03+08:00"
        }))
        .unwrap();
        let snap = r.into_snapshot("XAU/USD").unwrap();
        assert_eq!(snap.received_at, 3_000);
        assert_eq!(snap.symbol, "XAU/USD");
    }

    #[test]
    fn price_response_naive_refresh_time_uses_receive_time() {
        let r: PriceResponse = serde_json::from_value(json!({
            "success": true, "current_price": 2650.0, "price_change": 0, "price_change_pct": 0,
            "price_refresh_time": "2026-10-19T16:00:00.000000"
        }))
        .unwrap();
        let before = time_util::now_ms();
        let snap = r.into_snapshot("XAU/USD").unwrap();
        let after = time_util::now_ms();
        assert!((before..=after).contains(&snap.received_at), "{}", snap.received_at);
    }

    #[test]
    fn market_depth_response_pairs_ladder_rows() {
        let r: MarketDepthResponse = serde_json::from_value(json!({
            "bids": [{"price": 100.0, "volume": 2.0}, {"price": 99.0, "volume": 1.0}],
            "asks": [{"price": 101.0, "volume": 4.0}],
            "current_price": 100.5, "best_bid": 100.0, "best_ask": 101.0, "spread": 1.0,
            "symbol": "PAXGUSDT", "is_simulated": false
        }))
        .unwrap();
        let (book, depth) = r.into_snapshots("IGNORED", 77);
        assert_eq!(book.symbol, "PAXGUSDT");
        assert_eq!(book.best_ask(), Some(101.0));
        assert_eq!(depth.levels.len(), 2);
        assert_eq!(depth.levels[0].ask_volume, 4.0);
        assert_eq!(depth.levels[1].ask_volume, 0.0);
        assert_eq!(depth.received_at, 77);
    }
}
