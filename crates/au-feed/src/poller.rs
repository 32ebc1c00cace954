//! Polling fallback.
//!
//! The coordinator polls the REST collaborator on a fixed interval no matter
//! what the push channel is doing, and writes results through the same
//! last-write-wins path as push handlers. Each tick runs in its own task, so a
//! slow or failing request never cancels or delays the ticks after it.

use std::sync::Arc;

use au_core::config::PollingConfig;
use au_core::error::SyncError;
use au_core::time_util;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::rest::PriceSource;
use crate::store::StateStore;

pub struct PollingCoordinator<S: PriceSource> {
    source: Arc<S>,
    store: Arc<StateStore>,
    config: PollingConfig,
}

impl<S: PriceSource> Clone for PollingCoordinator<S> {
    fn clone(&self) -> Self {
        Self { source: self.source.clone(), store: self.store.clone(), config: self.config.clone() }
    }
}

impl<S: PriceSource + 'static> PollingCoordinator<S> {
    pub fn new(source: Arc<S>, store: Arc<StateStore>, config: PollingConfig) -> Self {
        Self { source, store, config }
    }

    /// Fetch the reference price and apply it. Returns whether the store accepted it.
    pub async fn poll_price(&self) -> Result<bool, SyncError> {
        let snapshot = self.source.fetch_price().await?.into_snapshot(&self.config.price_symbol)?;
        Ok(self.store.apply_price(&self.config.price_symbol, snapshot))
    }

    /// Fetch the order book and apply both the book and its depth ladder.
    pub async fn poll_market_depth(&self) -> Result<bool, SyncError> {
        let symbol = &self.config.depth_symbol;
        let resp = self.source.fetch_market_depth(symbol, self.config.depth_limit).await?;
        if resp.is_simulated {
            debug!("[poller] market depth for {symbol} is simulated");
        }
        let (book, depth) = resp.into_snapshots(symbol, time_util::now_ms());
        let key = book.symbol.clone();
        let accepted = self.store.apply_order_book(&key, book);
        self.store.apply_depth(&key, depth);
        Ok(accepted)
    }

    /// One scheduled tick. Failures are logged and isolated to this tick.
    pub async fn poll_once(&self) {
        if let Err(e) = self.poll_price().await {
            warn!("[poller] price: {e}");
        }
        if self.config.poll_market_depth {
            if let Err(e) = self.poll_market_depth().await {
                warn!("[poller] market depth: {e}");
            }
        }
    }

    /// Initial fill of the store before the first push arrives: price and
    /// market depth once, concurrently.
    pub async fn hydrate(&self) {
        let (price, depth) = tokio::join!(self.poll_price(), self.poll_market_depth());
        match (&price, &depth) {
            (Ok(_), Ok(_)) => info!("[poller] hydrated price and market depth"),
            _ => {
                if let Err(e) = price {
                    warn!("[poller] hydrate price: {e}");
                }
                if let Err(e) = depth {
                    warn!("[poller] hydrate market depth: {e}");
                }
            }
        }
    }

    /// Tick every interval until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();
        info!("[poller] started, interval={period:?}");

        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let this = self.clone();
                    in_flight.spawn(async move { this.poll_once().await });
                }
                Some(res) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = res {
                        warn!("[poller] tick task failed: {e}");
                    }
                }
            }
        }

        in_flight.abort_all();
        info!("[poller] stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryPriceSource;
    use std::time::Duration;

    fn config() -> PollingConfig {
        PollingConfig { price_symbol: "XAU".into(), ..PollingConfig::default() }
    }

    fn coordinator(source: &Arc<MemoryPriceSource>) -> (PollingCoordinator<MemoryPriceSource>, Arc<StateStore>) {
        let store = Arc::new(StateStore::default());
        (PollingCoordinator::new(source.clone(), store.clone(), config()), store)
    }

    #[tokio::test]
    async fn poll_applies_price_under_configured_symbol() {
        let source = Arc::new(MemoryPriceSource::new());
        source.push_price(Some(MemoryPriceSource::price(90.0, 3)));
        let (poller, store) = coordinator(&source);

        assert!(poller.poll_price().await.unwrap());
        let p = store.price("XAU").unwrap();
        assert_eq!((p.price, p.received_at), (90.0, 3));
    }

    #[tokio::test]
    async fn late_poll_does_not_override_newer_push() {
        let source = Arc::new(MemoryPriceSource::new());
        source.push_price(Some(MemoryPriceSource::price(90.0, 3)));
        let (poller, store) = coordinator(&source);
        store.apply_price(
            "XAU",
            au_core::types::PriceSnapshot {
                symbol: "XAU".into(),
                price: 100.0,
                change: 0.0,
                change_pct: 0.0,
                volume: None,
                received_at: 5,
            },
        );

        assert!(!poller.poll_price().await.unwrap());
        assert_eq!(store.price("XAU").unwrap().price, 100.0);
    }

    #[tokio::test]
    async fn naive_refresh_time_does_not_block_later_push() {
        let source = Arc::new(MemoryPriceSource::new());
        let mut resp = MemoryPriceSource::price(2650.0, 0);
        resp.price_refresh_time = Some(serde_json::json!("2099-10-19T16:00:00.000000"));
        source.push_price(Some(resp));
        let (poller, store) = coordinator(&source);
        assert!(poller.poll_price().await.unwrap());

        let pushed = au_core::types::PriceSnapshot {
            symbol: "XAU".into(),
            price: 2700.0,
            change: 0.0,
            change_pct: 0.0,
            volume: None,
            received_at: time_util::now_ms() + 60_000,
        };
        assert!(store.apply_price("XAU", pushed));
        assert_eq!(store.price("XAU").unwrap().price, 2700.0);
    }

    #[tokio::test]
    async fn unsuccessful_response_never_reaches_store() {
        let source = Arc::new(MemoryPriceSource::new());
        let mut resp = MemoryPriceSource::price(0.0, 9);
        resp.success = false;
        source.push_price(Some(resp));
        let (poller, store) = coordinator(&source);

        assert!(matches!(poller.poll_price().await, Err(SyncError::PollFailure(_))));
        assert!(store.price("XAU").is_none());
    }

    #[tokio::test]
    async fn hydrate_fills_price_and_depth() {
        let source = Arc::new(MemoryPriceSource::new());
        source.push_price(Some(MemoryPriceSource::price(2650.0, 1)));
        let (poller, store) = coordinator(&source);

        poller.hydrate().await;
        assert!(store.price("XAU").is_some());
        let book = store.order_book("PAXGUSDT").unwrap();
        assert_eq!(book.best_bid(), Some(2649.0));
        assert_eq!(store.depth("PAXGUSDT").unwrap().levels.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_ticks() {
        let source = Arc::new(MemoryPriceSource::new());
        source.push_price(None);
        source.push_price(None);
        source.push_price(Some(MemoryPriceSource::price(1.0, 1)));
        let (poller, store) = coordinator(&source);
        let (tx, rx) = watch::channel(false);
        let task = poller.spawn(rx);

        tokio::time::sleep(Duration::from_millis(30_500)).await;
        assert_eq!(source.price_calls(), 3);
        assert_eq!(store.price("XAU").unwrap().price, 1.0);

        tx.send(true).unwrap();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.price_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_does_not_delay_next_tick() {
        let source = Arc::new(MemoryPriceSource::new().with_latency(Duration::from_secs(25)));
        let (poller, _store) = coordinator(&source);
        let (_tx, rx) = watch::channel(false);
        let _task = poller.spawn(rx);

        tokio::time::sleep(Duration::from_millis(30_500)).await;
        assert_eq!(source.price_calls(), 3);
    }
}
