//! # au-runner
//!
//! Headless runner for the Aurum market dashboard sync layer.
//!
//! Loads a JSON configuration file (or built-in defaults), hydrates the state
//! store from REST, opens the push channel, keeps the polling fallback running
//! and logs market state until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! au-runner config.json --log-level info
//! au-runner --url ws://localhost:8000/ws --log-format json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use au_core::config::AppConfig;
use au_core::logging::LogFormat;
use au_core::ws::WsConnector;
use au_feed::poller::PollingCoordinator;
use au_feed::rest::RestClient;
use au_feed::store::StateStore;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Aurum market dashboard sync runner.
#[derive(Parser)]
#[command(name = "au-runner", about = "Aurum market dashboard sync runner")]
struct Cli {
    /// Configuration file path (JSON). Defaults are used when omitted.
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format (text, json). Overrides the config file.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Push channel URL. Overrides the config file.
    #[arg(long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut config = match &cli.config {
        Some(path) => au_core::config::load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.channel.url = url.clone();
        config.validate()?;
    }

    // 2. Initialize logging
    let log_level = cli.log_level.clone().unwrap_or_else(|| config.meta.log_level.clone());
    let log_format = cli.log_format.unwrap_or(config.meta.log_format);
    let log_dir = cli.log_dir.clone().or_else(|| config.meta.log_path.clone());
    let _log_guard =
        au_core::logging::init_logging(&log_level, log_format, log_dir.as_deref(), &config.meta.module_name);

    info!(
        "au-runner starting, config={}, channel={}, rest={}",
        cli.config.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<defaults>".into()),
        config.channel.url,
        config.rest.base_url,
    );

    // 3. Shared state and REST side
    let store = Arc::new(StateStore::new(&config.store));
    let rest = Arc::new(RestClient::new(&config.rest)?);
    let poller = PollingCoordinator::new(rest, store.clone(), config.polling.clone());
    poller.hydrate().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_task = poller.spawn(shutdown_rx.clone());

    // 4. Push channel
    let (channel, channel_task) = au_feed::spawn_channel(&config.channel, WsConnector::new(), &store);
    channel.on_state_change(Box::new(|state| info!("channel state: {state}")))?;
    channel.connect()?;

    // 5. Periodic status until Ctrl+C
    let status_task = tokio::spawn(log_status(channel.clone(), store.clone(), config.polling.depth_symbol.clone(), shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 6. Stop everything
    let _ = shutdown_tx.send(true);
    channel.shutdown();
    for (name, task) in [("channel", channel_task), ("poller", poller_task), ("status", status_task)] {
        if let Err(e) = task.await {
            warn!("{name} task ended abnormally: {e}");
        }
    }

    info!("au-runner stopped");
    Ok(())
}

async fn log_status(
    channel: au_feed::driver::ChannelHandle,
    store: Arc<StateStore>,
    depth_symbol: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    loop {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match channel.stats().await {
                    Ok(stats) => info!(
                        "channel {} attempt={} messages={} last_message_ms={:?}",
                        stats.state, stats.reconnect_attempt, stats.message_count, stats.last_message_ms
                    ),
                    Err(e) => warn!("channel stats unavailable: {e}"),
                }
                for price in store.prices() {
                    info!("{price}");
                }
                if let Some(book) = store.order_book(&depth_symbol) {
                    info!(
                        "{} bid={:?} ask={:?} spread={:?}",
                        book.symbol,
                        book.best_bid(),
                        book.best_ask(),
                        book.spread()
                    );
                }
            }
        }
    }
}
