//! Push-message handlers that write into the [`StateStore`].
//!
//! Every snapshot is stamped with the envelope timestamp (local receive time
//! when the server omits it), so push and poll writes reconcile by event time.
//! Payloads that fail to decode are logged and dropped.

use std::sync::Arc;

use au_core::types::{Message, MessageTag};
use serde::de::DeserializeOwned;
use tracing::{trace, warn};

use crate::dispatcher::{Dispatcher, Handler};
use crate::store::StateStore;
use crate::wire::{self, MarketDepthPayload, OrderBookPayload, PricePayload, TradePayload};

/// Build the handler for one tag, or `None` for tags that carry no state.
pub fn store_handler(tag: MessageTag, store: Arc<StateStore>) -> Option<Handler> {
    let handler: Handler = match tag {
        MessageTag::Price => Box::new(move |msg: &Message| {
            if let Some(p) = decode::<PricePayload>(msg) {
                let snap = p.into_snapshot(msg.event_time_ms());
                let symbol = snap.symbol.clone();
                store.apply_price(&symbol, snap);
            }
        }),
        MessageTag::Orderbook => Box::new(move |msg: &Message| {
            if let Some(p) = decode::<OrderBookPayload>(msg) {
                let snap = p.into_snapshot(msg.event_time_ms());
                let symbol = snap.symbol.clone();
                store.apply_order_book(&symbol, snap);
            }
        }),
        MessageTag::MarketDepth => Box::new(move |msg: &Message| {
            if let Some(p) = decode::<MarketDepthPayload>(msg) {
                let snap = p.into_snapshot(msg.event_time_ms());
                let symbol = snap.symbol.clone();
                store.apply_depth(&symbol, snap);
            }
        }),
        MessageTag::Trade => Box::new(move |msg: &Message| {
            if let Some(p) = decode::<TradePayload>(msg) {
                store.push_trade(p.into_tick(msg.event_time_ms()));
            }
        }),
        MessageTag::News => Box::new(move |msg: &Message| {
            store.push_news(wire::news_item(msg.data.clone(), msg.event_time_ms()));
        }),
        MessageTag::Heartbeat => return None,
    };
    Some(handler)
}

/// Bind store handlers for every state-carrying tag.
pub fn bind_store_handlers(dispatcher: &mut Dispatcher, store: &Arc<StateStore>) {
    for tag in MessageTag::ALL {
        if let Some(handler) = store_handler(tag, store.clone()) {
            dispatcher.bind(tag, handler);
        }
    }
    // Keep heartbeat replies out of the "no handler" debug log.
    dispatcher.bind(MessageTag::Heartbeat, Box::new(|_msg: &Message| trace!("[heartbeat] pong")));
}

fn decode<T: DeserializeOwned>(msg: &Message) -> Option<T> {
    match T::deserialize(&msg.data) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("[handlers] dropped {} payload: {e}", msg.tag);
            None
        }
    }
}
