//! REST collaborator used by the polling fallback.
//!
//! [`PriceSource`] is the seam between the poller and HTTP; [`RestClient`] is
//! the reqwest implementation. Every failure, including transport errors,
//! non-2xx statuses, undecodable bodies and `success: false`, surfaces as
//! [`SyncError::PollFailure`].

use async_trait::async_trait;
use au_core::config::RestConfig;
use au_core::error::SyncError;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::wire::{MarketDepthResponse, PriceResponse};

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// `GET /price`: latest reference price.
    async fn fetch_price(&self) -> Result<PriceResponse, SyncError>;

    /// `GET /market-depth?symbol=..&limit=..`: order book levels.
    async fn fetch_market_depth(&self, symbol: &str, limit: u32) -> Result<MarketDepthResponse, SyncError>;
}

pub struct RestClient {
    base_url: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(config: &RestConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("http client: {e}")))?;
        Ok(Self { base_url: config.base_url.trim_end_matches('/').to_string(), http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SyncError> {
        trace!("[rest] GET {url}");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| poll_failure(url, e))?
            .error_for_status()
            .map_err(|e| poll_failure(url, e))?;
        resp.json::<T>().await.map_err(|e| poll_failure(url, e))
    }
}

#[async_trait]
impl PriceSource for RestClient {
    async fn fetch_price(&self) -> Result<PriceResponse, SyncError> {
        let url = format!("{}/price", self.base_url);
        self.get_json(&url).await
    }

    async fn fetch_market_depth(&self, symbol: &str, limit: u32) -> Result<MarketDepthResponse, SyncError> {
        let url = format!(
            "{}/market-depth?symbol={}&limit={limit}",
            self.base_url,
            urlencoding::encode(symbol)
        );
        self.get_json(&url).await
    }
}

fn poll_failure(url: &str, e: reqwest::Error) -> SyncError {
    SyncError::PollFailure(format!("GET {url}: {e}"))
}
