//! Configuration parsing for the sync runner.
//!
//! Settings come from a single JSON file. Every field has a default, so an
//! empty object `{}` yields a working configuration pointed at a local
//! dashboard backend.
//!
//! # Example config
//!
//! ```json
//! {
//!   "AuSync": { "module_name": "au-runner", "log_path": "/tmp/log", "log_level": "debug" },
//!   "channel": { "url": "ws://localhost:8000/ws", "max_reconnect_attempts": 5 },
//!   "rest": { "base_url": "http://localhost:8000/api/v1" },
//!   "polling": { "interval_ms": 10000, "poll_market_depth": true }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::SyncError;
use crate::logging::LogFormat;

/// Depth limits accepted by the `/market-depth` endpoint.
pub const VALID_DEPTH_LIMITS: [u32; 5] = [5, 10, 20, 50, 100];

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Module metadata (name, log settings).
    #[serde(rename = "AuSync")]
    pub meta: ModuleMeta,
    pub channel: ChannelConfig,
    pub rest: RestConfig,
    pub polling: PollingConfig,
    pub store: StoreConfig,
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModuleMeta {
    pub module_name: String,
    pub log_path: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ModuleMeta {
    fn default() -> Self {
        Self {
            module_name: "au-runner".into(),
            log_path: None,
            log_level: "info".into(),
            log_format: LogFormat::Text,
        }
    }
}

/// Push channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// WebSocket URL of the push channel.
    pub url: String,
    /// Consecutive abnormal closes tolerated before entering `Failed`.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt.
    pub reconnect_delay_ms: u64,
    /// Growth factor per attempt; `1.0` keeps the delay fixed.
    pub reconnect_backoff_multiplier: f64,
    /// Upper bound on the reconnect delay.
    pub max_reconnect_delay_ms: u64,
    /// Interval between keep-alive pings while connected.
    pub heartbeat_interval_ms: u64,
    /// Symbols subscribed from the start.
    pub default_symbols: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".into(),
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 3_000,
            reconnect_backoff_multiplier: 1.0,
            max_reconnect_delay_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            default_symbols: vec!["AU9999".into(), "XAU/USD".into()],
        }
    }
}

impl ChannelConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// REST collaborator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// Base URL; endpoint paths (`/price`, `/market-depth`) are appended.
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:8000/api/v1".into(), timeout_ms: 30_000 }
    }
}

impl RestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Polling fallback settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    /// Symbol the `/price` result is stored under.
    pub price_symbol: String,
    /// Symbol requested from `/market-depth`.
    pub depth_symbol: String,
    pub depth_limit: u32,
    /// Also poll `/market-depth` on every tick.
    pub poll_market_depth: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            price_symbol: "XAU/USD".into(),
            depth_symbol: "PAXGUSDT".into(),
            depth_limit: 10,
            poll_market_depth: false,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// State store buffer sizes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Trades kept per symbol.
    pub recent_trades: usize,
    /// News items kept in total.
    pub recent_news: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { recent_trades: 50, recent_news: 20 }
    }
}

impl AppConfig {
    /// Reject settings that would make the channel or the poller spin or stall.
    pub fn validate(&self) -> Result<(), SyncError> {
        let ch = &self.channel;
        if !(ch.url.starts_with("ws://") || ch.url.starts_with("wss://")) {
            return Err(SyncError::Config(format!("channel.url must be ws:// or wss://, got {}", ch.url)));
        }
        if ch.max_reconnect_attempts == 0 {
            return Err(SyncError::Config("channel.max_reconnect_attempts must be > 0".into()));
        }
        if ch.heartbeat_interval_ms == 0 {
            return Err(SyncError::Config("channel.heartbeat_interval_ms must be > 0".into()));
        }
        if !(ch.reconnect_backoff_multiplier >= 1.0) {
            return Err(SyncError::Config("channel.reconnect_backoff_multiplier must be >= 1.0".into()));
        }
        if self.polling.interval_ms == 0 {
            return Err(SyncError::Config("polling.interval_ms must be > 0".into()));
        }
        if !VALID_DEPTH_LIMITS.contains(&self.polling.depth_limit) {
            return Err(SyncError::Config(format!(
                "polling.depth_limit must be one of {VALID_DEPTH_LIMITS:?}, got {}",
                self.polling.depth_limit
            )));
        }
        Ok(())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> Result<AppConfig, SyncError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
    let config: AppConfig =
        serde_json::from_str(&content).map_err(|e| SyncError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.channel.max_reconnect_attempts, 5);
        assert_eq!(cfg.channel.reconnect_delay(), Duration::from_millis(3_000));
        assert_eq!(cfg.channel.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.polling.interval(), Duration::from_secs(10));
        assert_eq!(cfg.channel.default_symbols, vec!["AU9999", "XAU/USD"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"AuSync":{"log_format":"json"},"channel":{"url":"wss://feed.example/ws","max_reconnect_attempts":2}}"#,
        )
        .unwrap();
        assert_eq!(cfg.meta.log_format, LogFormat::Json);
        assert_eq!(cfg.channel.url, "wss://feed.example/ws");
        assert_eq!(cfg.channel.max_reconnect_attempts, 2);
        assert_eq!(cfg.channel.reconnect_delay_ms, 3_000);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.channel.url = "http://localhost".into();
        assert!(matches!(cfg.validate(), Err(SyncError::Config(_))));

        let mut cfg = AppConfig::default();
        cfg.polling.depth_limit = 7;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.channel.max_reconnect_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.channel.reconnect_backoff_multiplier = 0.5;
        assert!(cfg.validate().is_err());
    }
}
