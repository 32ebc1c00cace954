//! Push-channel connection manager.
//!
//! [`ConnectionManager`] owns the transport link, the lifecycle state machine,
//! the reconnect timer, the heartbeat, the subscription registry and the
//! dispatcher. It is a plain synchronous state machine: every input is a
//! method call (`connect`, `disconnect`, `subscribe`, ...) or a
//! [`ChannelEvent`] passed to [`handle_event`](ConnectionManager::handle_event).
//! Exactly one task drives it (see [`crate::driver`]), so its state needs no
//! locking.
//!
//! # Epochs
//!
//! Link callbacks and timers only enqueue [`ChannelEvent`]s tagged with the
//! epoch current when they were armed. Opening or tearing down a link bumps
//! the epoch, and events from an older epoch are dropped. A late close from a
//! replaced link, or a reconnect timer that fired just before `disconnect()`,
//! therefore cannot touch the current connection.
//!
//! # Reconnect flow
//!
//! ```text
//! close/error ──► Disconnected ──► attempt += 1 ──► attempt < max ? ──► timer ──► Connecting
//!                                                        │ no
//!                                                        ▼
//!                                                      Failed  (until manual connect())
//! ```

use std::sync::Arc;
use std::time::Duration;

use au_core::config::ChannelConfig;
use au_core::error::SyncError;
use au_core::time_util;
use au_core::types::{ConnectionState, ControlFrame, MessageTag};
use au_core::ws::{Connector, Link, LinkEvent, OnLinkEvent};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::dispatcher::{Dispatcher, Handler};
use crate::heartbeat::HeartbeatMonitor;
use crate::subscription::SubscriptionRegistry;
use crate::timer::TimerGuard;

/// Inputs produced by link callbacks and timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Link { epoch: u64, event: LinkEvent },
    ReconnectDue { epoch: u64 },
    HeartbeatDue { epoch: u64 },
}

pub type EventSender = mpsc::UnboundedSender<ChannelEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ChannelEvent>;

/// Observer called synchronously on every state transition, in order.
pub type StateObserver = Box<dyn FnMut(ConnectionState) + Send>;

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// Attempt cap and delay schedule for automatic reconnects.
///
/// The delay for attempt `n` (1-based) is `delay * multiplier^(n-1)`, capped
/// at `max_delay`. A multiplier of `1.0` gives a fixed delay.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    current_attempt: u32,
}

impl ReconnectPolicy {
    /// Fixed-delay policy.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay, multiplier: 1.0, max_delay: delay, current_attempt: 0 }
    }

    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.multiplier = multiplier.max(1.0);
        self.max_delay = max_delay.max(self.delay);
        self
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(config.max_reconnect_attempts, config.reconnect_delay())
            .with_backoff(config.reconnect_backoff_multiplier, config.max_reconnect_delay())
    }

    /// Count one abnormal close. Returns the delay before the next attempt,
    /// or `None` once the cap is reached.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.current_attempt = self.current_attempt.saturating_add(1);
        (self.current_attempt < self.max_attempts).then(|| self.delay_for(self.current_attempt))
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.delay.as_secs_f64() * self.multiplier.powi(exp);
        if scaled.is_finite() {
            Duration::from_secs_f64(scaled).min(self.max_delay)
        } else {
            self.max_delay
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelStats
// ---------------------------------------------------------------------------

/// Point-in-time view of the channel for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
    /// Local receive time of the last successfully parsed frame.
    pub last_message_ms: Option<u64>,
    pub message_count: u64,
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

pub struct ConnectionManager<C: Connector> {
    url: String,
    connector: C,
    link: Option<C::Link>,
    state: ConnectionState,
    epoch: u64,
    explicit_disconnect: bool,
    policy: ReconnectPolicy,
    reconnect_timer: Option<TimerGuard>,
    heartbeat: HeartbeatMonitor,
    subscriptions: SubscriptionRegistry,
    dispatcher: Dispatcher,
    observers: Vec<StateObserver>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: EventSender,
    last_message_ms: Option<u64>,
    message_count: u64,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create an idle manager. The returned receiver carries the events that
    /// must be fed back through [`handle_event`](Self::handle_event).
    pub fn new(config: &ChannelConfig, connector: C) -> (Self, EventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let manager = Self {
            url: config.url.clone(),
            connector,
            link: None,
            state: ConnectionState::Idle,
            epoch: 0,
            explicit_disconnect: false,
            policy: ReconnectPolicy::from_config(config),
            reconnect_timer: None,
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval()),
            subscriptions: SubscriptionRegistry::new(config.default_symbols.iter().cloned()),
            dispatcher: Dispatcher::new(),
            observers: Vec::new(),
            state_tx,
            events_tx,
            last_message_ms: None,
            message_count: 0,
        };
        (manager, events_rx)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_running()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            state: self.state,
            reconnect_attempt: self.policy.current_attempt(),
            last_message_ms: self.last_message_ms,
            message_count: self.message_count,
        }
    }

    // -- Registration ------------------------------------------------------

    pub fn on_state_change(&mut self, observer: StateObserver) {
        self.observers.push(observer);
    }

    /// Bind the handler for `tag`, replacing any previous one.
    pub fn bind_handler(&mut self, tag: MessageTag, handler: Handler) -> bool {
        self.dispatcher.bind(tag, handler)
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    // -- Commands ----------------------------------------------------------

    /// Start connecting. No-op while `Connecting` or `Connected`.
    ///
    /// A manual connect resets the attempt counter, so it is also the way out
    /// of `Failed`. Returns immediately; the outcome arrives as events.
    pub fn connect(&mut self) {
        if self.state.is_active() {
            debug!("[channel] connect() ignored while {}", self.state);
            return;
        }
        self.explicit_disconnect = false;
        self.reconnect_timer = None;
        self.policy.reset();
        self.open_link();
    }

    /// Close the channel and suppress automatic reconnects. Always legal.
    pub fn disconnect(&mut self) {
        self.explicit_disconnect = true;
        self.reconnect_timer = None;
        self.heartbeat.stop();
        self.teardown_link();
        self.policy.reset();
        if self.state != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected);
        }
    }

    /// Add symbols to the desired set; sends the full set if connected.
    pub fn subscribe<S: AsRef<str>>(&mut self, symbols: &[S]) {
        let connected = self.state == ConnectionState::Connected;
        if let Some(frame) = self.subscriptions.subscribe(symbols, connected) {
            let _ = self.send(&frame);
        }
    }

    /// Remove symbols from the desired set; sends the removed ones if connected.
    pub fn unsubscribe<S: AsRef<str>>(&mut self, symbols: &[S]) {
        let connected = self.state == ConnectionState::Connected;
        if let Some(frame) = self.subscriptions.unsubscribe(symbols, connected) {
            let _ = self.send(&frame);
        }
    }

    /// Drop every desired symbol.
    pub fn clear_subscriptions(&mut self) {
        let connected = self.state == ConnectionState::Connected;
        if let Some(frame) = self.subscriptions.clear(connected) {
            let _ = self.send(&frame);
        }
    }

    /// Send a control frame. Rejected (and logged) unless `Connected`.
    pub fn send(&mut self, frame: &ControlFrame) -> Result<(), SyncError> {
        if self.state != ConnectionState::Connected {
            let err = SyncError::SendRejected { state: self.state };
            warn!("[channel] {err}, skipping {:?} frame", frame.kind);
            return Err(err);
        }
        let Some(link) = self.link.as_ref() else {
            return Err(SyncError::TransportFailure("connected without a link".into()));
        };
        link.send(frame.to_text()).inspect_err(|e| warn!("[channel] send failed: {e}"))
    }

    // -- Events ------------------------------------------------------------

    /// Process one event from a link callback or timer. Stale events are dropped.
    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Link { epoch, event } if epoch == self.epoch => self.on_link_event(event),
            ChannelEvent::ReconnectDue { epoch } if epoch == self.epoch => self.on_reconnect_due(),
            ChannelEvent::HeartbeatDue { epoch } if epoch == self.epoch => self.on_heartbeat_due(),
            stale => trace!("[channel] dropped stale event {stale:?}"),
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened => self.on_open(),
            LinkEvent::Text(text) => self.on_frame(&text),
            LinkEvent::Error(reason) => self.on_transport_loss(&reason),
            LinkEvent::Closed(reason) => {
                self.on_transport_loss(reason.as_deref().unwrap_or("closed by remote"))
            }
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!("[channel] open ignored while {}", self.state);
            return;
        }
        self.transition(ConnectionState::Connected);
        self.policy.reset();

        let epoch = self.epoch;
        let tx = self.events_tx.clone();
        self.heartbeat.start(move || {
            let _ = tx.send(ChannelEvent::HeartbeatDue { epoch });
        });

        if let Some(frame) = self.subscriptions.resync_frame() {
            info!("[channel] resubscribing {} symbol(s)", self.subscriptions.len());
            let _ = self.send(&frame);
        }
    }

    fn on_frame(&mut self, text: &str) {
        match self.dispatcher.dispatch(text) {
            Ok(_) => {
                self.last_message_ms = Some(time_util::now_ms());
                self.message_count += 1;
            }
            Err(e) => warn!("[channel] dropped frame: {e}"),
        }
    }

    /// Abnormal close or error on the current link.
    fn on_transport_loss(&mut self, reason: &str) {
        if self.explicit_disconnect || !self.state.is_active() {
            debug!("[channel] transport loss ignored while {}: {reason}", self.state);
            return;
        }
        warn!("[channel] {}", SyncError::TransportFailure(reason.to_string()));

        self.heartbeat.stop();
        self.teardown_link();
        self.transition(ConnectionState::Disconnected);

        match self.policy.record_failure() {
            Some(delay) => {
                info!(
                    "[channel] reconnecting in {delay:?} (attempt {}/{})",
                    self.policy.current_attempt(),
                    self.policy.max_attempts()
                );
                let epoch = self.epoch;
                let tx = self.events_tx.clone();
                self.reconnect_timer = Some(TimerGuard::once(delay, move || {
                    let _ = tx.send(ChannelEvent::ReconnectDue { epoch });
                }));
            }
            None => {
                error!("[channel] {}", SyncError::RetriesExhausted(self.policy.current_attempt()));
                self.transition(ConnectionState::Failed);
            }
        }
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect_timer = None;
        if self.explicit_disconnect || self.state != ConnectionState::Disconnected {
            debug!("[channel] reconnect timer ignored while {}", self.state);
            return;
        }
        self.open_link();
    }

    fn on_heartbeat_due(&mut self) {
        if self.state == ConnectionState::Connected {
            trace!("[heartbeat] ping");
            let _ = self.send(&ControlFrame::ping());
        }
    }

    // -- Internals ---------------------------------------------------------

    fn open_link(&mut self) {
        self.teardown_link();
        let epoch = self.epoch;
        self.transition(ConnectionState::Connecting);

        let tx = self.events_tx.clone();
        let on_event: OnLinkEvent = Arc::new(move |event| {
            let _ = tx.send(ChannelEvent::Link { epoch, event });
        });

        match self.connector.open(&self.url, on_event) {
            Ok(link) => self.link = Some(link),
            Err(e) => self.on_transport_loss(&e.to_string()),
        }
    }

    /// Close the current link (if any) and invalidate everything armed for it.
    fn teardown_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.epoch += 1;
    }

    fn transition(&mut self, next: ConnectionState) {
        let prev = self.state;
        debug_assert!(prev.can_transition_to(next), "illegal transition {prev} -> {next}");
        self.state = next;
        info!("[channel] {prev} -> {next}");
        for observer in &mut self.observers {
            observer(next);
        }
        self.state_tx.send_replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryConnector, pump};
    use au_core::types::ConnectionState::*;
    use parking_lot::Mutex;

    fn config(max_attempts: u32) -> ChannelConfig {
        ChannelConfig {
            max_reconnect_attempts: max_attempts,
            default_symbols: vec![],
            ..ChannelConfig::default()
        }
    }

    fn recorded(mgr: &mut ConnectionManager<MemoryConnector>) -> Arc<Mutex<Vec<ConnectionState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        mgr.on_state_change(Box::new(move |st| s.lock().push(st)));
        seen
    }

    #[test]
    fn fixed_policy_counts_to_cap() {
        let mut p = ReconnectPolicy::new(3, Duration::from_secs(3));
        assert_eq!(p.record_failure(), Some(Duration::from_secs(3)));
        assert_eq!(p.record_failure(), Some(Duration::from_secs(3)));
        assert_eq!(p.record_failure(), None);
        p.reset();
        assert_eq!(p.current_attempt(), 0);
    }

    #[test]
    fn backoff_policy_grows_and_caps() {
        let mut p = ReconnectPolicy::new(10, Duration::from_secs(1)).with_backoff(2.0, Duration::from_secs(5));
        let delays: Vec<_> = (0..5).filter_map(|_| p.record_failure()).collect();
        assert_eq!(
            delays,
            vec![1, 2, 4, 5, 5].into_iter().map(Duration::from_secs).collect::<Vec<_>>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_open_resubscribes_and_starts_heartbeat() {
        let conn = MemoryConnector::new();
        let mut cfg = config(5);
        cfg.default_symbols = vec!["AU9999".into()];
        let (mut mgr, mut rx) = ConnectionManager::new(&cfg, conn.clone());
        let seen = recorded(&mut mgr);

        mgr.connect();
        mgr.connect(); // idempotent
        assert_eq!(conn.opens(), 1);

        conn.emit(LinkEvent::Opened);
        pump(&mut mgr, &mut rx);

        assert_eq!(*seen.lock(), vec![Connecting, Connected]);
        assert!(mgr.heartbeat_running());
        let frames = conn.sent_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "subscribe");
        assert_eq!(frames[0]["data"]["symbols"], serde_json::json!(["AU9999"]));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_pings_only_while_connected() {
        let conn = MemoryConnector::new();
        let (mut mgr, mut rx) = ConnectionManager::new(&config(5), conn.clone());
        mgr.connect();
        conn.emit(LinkEvent::Opened);
        pump(&mut mgr, &mut rx);

        tokio::time::sleep(Duration::from_secs(61)).await;
        pump(&mut mgr, &mut rx);
        let pings = conn.sent_frames().iter().filter(|f| f["type"] == "ping").count();
        assert_eq!(pings, 2);

        mgr.disconnect();
        assert!(!mgr.heartbeat_running());
        tokio::time::sleep(Duration::from_secs(120)).await;
        pump(&mut mgr, &mut rx);
        let pings = conn.sent_frames().iter().filter(|f| f["type"] == "ping").count();
        assert_eq!(pings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn close_schedules_reconnect_after_delay() {
        let conn = MemoryConnector::new();
        let (mut mgr, mut rx) = ConnectionManager::new(&config(5), conn.clone());
        mgr.connect();
        conn.emit(LinkEvent::Opened);
        pump(&mut mgr, &mut rx);

        conn.emit(LinkEvent::Closed(None));
        pump(&mut mgr, &mut rx);
        assert_eq!(mgr.state(), Disconnected);
        assert!(!mgr.heartbeat_running());
        assert!(mgr.reconnect_pending());
        assert_eq!(mgr.policy().current_attempt(), 1);

        tokio::time::sleep(Duration::from_millis(2_999)).await;
        pump(&mut mgr, &mut rx);
        assert_eq!(conn.opens(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        pump(&mut mgr, &mut rx);
        assert_eq!(mgr.state(), Connecting);
        assert_eq!(conn.opens(), 2);

        conn.emit(LinkEvent::Opened);
        pump(&mut mgr, &mut rx);
        assert_eq!(mgr.state(), Connected);
        assert_eq!(mgr.policy().current_attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn error_then_close_counts_once() {
        let conn = MemoryConnector::new();
        let (mut mgr, mut rx) = ConnectionManager::new(&config(5), conn.clone());
        mgr.connect();
        conn.emit(LinkEvent::Error("reset".into()));
        conn.emit(LinkEvent::Closed(None));
        pump(&mut mgr, &mut rx);
        assert_eq!(mgr.policy().current_attempt(), 1);
        assert_eq!(conn.closed_links(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let conn = MemoryConnector::new();
        let (mut mgr, mut rx) = ConnectionManager::new(&config(5), conn.clone());
        let seen = recorded(&mut mgr);
        mgr.connect();
        conn.emit(LinkEvent::Closed(None));
        pump(&mut mgr, &mut rx);
        assert!(mgr.reconnect_pending());

        mgr.disconnect();
        assert!(!mgr.reconnect_pending());
        assert_eq!(mgr.policy().current_attempt(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        pump(&mut mgr, &mut rx);
        assert_eq!(conn.opens(), 1);
        assert_eq!(*seen.lock(), vec![Connecting, Disconnected]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reconnect_event_is_ignored_after_disconnect() {
        let conn = MemoryConnector::new();
        let (mut mgr, mut rx) = ConnectionManager::new(&config(5), conn.clone());
        mgr.connect();
        conn.emit(LinkEvent::Closed(None));
        pump(&mut mgr, &mut rx);

        // Timer fires and its event is queued before disconnect() is processed.
        tokio::time::sleep(Duration::from_secs(4)).await;
        mgr.disconnect();
        pump(&mut mgr, &mut rx);

        assert_eq!(mgr.state(), Disconnected);
        assert_eq!(conn.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_enters_failed() {
        let conn = MemoryConnector::new();
        let (mut mgr, mut rx) = ConnectionManager::new(&config(3), conn.clone());
        mgr.connect();

        for _ in 0..3 {
            conn.emit(LinkEvent::Closed(None));
            pump(&mut mgr, &mut rx);
            tokio::time::sleep(Duration::from_secs(4)).await;
            pump(&mut mgr, &mut rx);
        }
        assert_eq!(mgr.state(), Failed);
        assert_eq!(conn.opens(), 3);

        conn.emit(LinkEvent::Closed(None));
        tokio::time::sleep(Duration::from_secs(60)).await;
        pump(&mut mgr, &mut rx);
        assert_eq!(mgr.state(), Failed);
        assert_eq!(conn.opens(), 3);

        mgr.connect();
        assert_eq!(mgr.state(), Connecting);
        assert_eq!(mgr.policy().current_attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_counts_as_transport_loss() {
        let conn = MemoryConnector::new();
        conn.fail_next_open();
        let (mut mgr, mut rx) = ConnectionManager::new(&config(5), conn.clone());
        let seen = recorded(&mut mgr);
        mgr.connect();
        pump(&mut mgr, &mut rx);
        assert_eq!(*seen.lock(), vec![Connecting, Disconnected]);
        assert!(mgr.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_leave_state_alone() {
        let conn = MemoryConnector::new();
        let (mut mgr, mut rx) = ConnectionManager::new(&config(5), conn.clone());
        mgr.connect();
        conn.emit(LinkEvent::Opened);
        conn.emit(LinkEvent::Text("{not json".into()));
        conn.emit(LinkEvent::Text(r#"{"data":{}}"#.into()));
        conn.emit(LinkEvent::Text(r#"{"type":"heartbeat","data":{},"timestamp":1}"#.into()));
        pump(&mut mgr, &mut rx);

        assert_eq!(mgr.state(), Connected);
        let stats = mgr.stats();
        assert_eq!(stats.message_count, 1);
        assert!(stats.last_message_ms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn send_while_disconnected_is_rejected() {
        let conn = MemoryConnector::new();
        let (mut mgr, _rx) = ConnectionManager::new(&config(5), conn.clone());
        let err = mgr.send(&ControlFrame::ping()).unwrap_err();
        assert!(matches!(err, SyncError::SendRejected { state: Idle }));
        assert!(conn.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_state_follows_transitions() {
        let conn = MemoryConnector::new();
        let (mut mgr, mut rx) = ConnectionManager::new(&config(5), conn.clone());
        let state_rx = mgr.watch_state();
        mgr.connect();
        conn.emit(LinkEvent::Opened);
        pump(&mut mgr, &mut rx);
        assert_eq!(*state_rx.borrow(), Connected);
    }
}
