//! # au-feed
//!
//! Real-time sync layer for the Aurum market dashboard.
//!
//! ## Architecture
//!
//! A [`connection::ConnectionManager`] owns the push channel and runs inside a
//! single [`driver::ChannelDriver`] task. Raw frames go to the
//! [`dispatcher::Dispatcher`], whose per-tag handlers ([`handlers`]) write into
//! the shared [`store::StateStore`]. A [`poller::PollingCoordinator`] writes to
//! the same store from the REST side on its own timer. The store reconciles
//! both sources by event time (last write wins).
//!
//! ## Modules
//!
//! - [`connection`] — lifecycle state machine, reconnect policy, epochs
//! - [`driver`] — task ownership and the cloneable `ChannelHandle`
//! - [`heartbeat`] / [`timer`] — keep-alive and scoped timers
//! - [`subscription`] — desired symbol set, resent on every connect
//! - [`dispatcher`] / [`handlers`] — tag routing and store writers
//! - [`store`] — last-write-wins market state
//! - [`rest`] / [`poller`] — REST collaborator and polling fallback
//! - [`wire`] / [`json_util`] — payload shapes and lenient number parsing
//! - [`testing`] — in-memory connector and price source

pub mod connection;
pub mod dispatcher;
pub mod driver;
pub mod handlers;
pub mod heartbeat;
pub mod json_util;
pub mod poller;
pub mod rest;
pub mod store;
pub mod subscription;
pub mod testing;
pub mod timer;
pub mod wire;

use std::sync::Arc;

use au_core::config::ChannelConfig;
use au_core::ws::Connector;
use tokio::task::JoinHandle;

use crate::connection::ConnectionManager;
use crate::driver::{ChannelDriver, ChannelHandle};
use crate::store::StateStore;

/// Build a manager with store handlers bound and move it into its driver task.
///
/// The manager is consumed, so the returned handle is the only way to reach
/// this channel.
pub fn spawn_channel<C>(config: &ChannelConfig, connector: C, store: &Arc<StateStore>) -> (ChannelHandle, JoinHandle<()>)
where
    C: Connector + 'static,
    C::Link: 'static,
{
    let (mut manager, events) = ConnectionManager::new(config, connector);
    handlers::bind_store_handlers(manager.dispatcher_mut(), store);
    ChannelDriver::spawn(manager, events)
}
