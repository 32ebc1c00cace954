//! Task that owns a [`ConnectionManager`] and serialises all access to it.
//!
//! Consumers hold a cloneable [`ChannelHandle`]; commands and link/timer
//! events are both queued to the single driver task, so manager callbacks
//! never run concurrently. Dropping every handle, or calling
//! [`ChannelHandle::shutdown`], disconnects the channel and ends the task.

use au_core::error::SyncError;
use au_core::types::{ConnectionState, MessageTag};
use au_core::ws::Connector;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connection::{ChannelStats, ConnectionManager, EventReceiver, StateObserver};
use crate::dispatcher::Handler;

pub enum Command {
    Connect,
    Disconnect,
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    ClearSubscriptions,
    BindHandler(MessageTag, Handler),
    OnStateChange(StateObserver),
    Stats(oneshot::Sender<ChannelStats>),
    Subscriptions(oneshot::Sender<Vec<String>>),
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => write!(f, "Connect"),
            Command::Disconnect => write!(f, "Disconnect"),
            Command::Subscribe(s) => write!(f, "Subscribe({s:?})"),
            Command::Unsubscribe(s) => write!(f, "Unsubscribe({s:?})"),
            Command::ClearSubscriptions => write!(f, "ClearSubscriptions"),
            Command::BindHandler(tag, _) => write!(f, "BindHandler({tag})"),
            Command::OnStateChange(_) => write!(f, "OnStateChange"),
            Command::Stats(_) => write!(f, "Stats"),
            Command::Subscriptions(_) => write!(f, "Subscriptions"),
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}

#[derive(Clone)]
pub struct ChannelHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ChannelHandle {
    fn send(&self, cmd: Command) -> Result<(), SyncError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|e| SyncError::TransportFailure(format!("channel driver stopped, dropped {:?}", e.0)))
    }

    /// Request a connection. Observe the outcome through [`watch_state`](Self::watch_state).
    pub fn connect(&self) -> Result<(), SyncError> {
        self.send(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<(), SyncError> {
        self.send(Command::Disconnect)
    }

    pub fn subscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), SyncError> {
        self.send(Command::Subscribe(symbols.iter().map(|s| s.as_ref().to_string()).collect()))
    }

    pub fn unsubscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Result<(), SyncError> {
        self.send(Command::Unsubscribe(symbols.iter().map(|s| s.as_ref().to_string()).collect()))
    }

    pub fn clear_subscriptions(&self) -> Result<(), SyncError> {
        self.send(Command::ClearSubscriptions)
    }

    pub fn bind_handler(&self, tag: MessageTag, handler: Handler) -> Result<(), SyncError> {
        self.send(Command::BindHandler(tag, handler))
    }

    pub fn on_state_change(&self, observer: StateObserver) -> Result<(), SyncError> {
        self.send(Command::OnStateChange(observer))
    }

    pub async fn stats(&self) -> Result<ChannelStats, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stats(tx))?;
        rx.await.map_err(|_| SyncError::TransportFailure("channel driver stopped".into()))
    }

    pub async fn subscriptions(&self) -> Result<Vec<String>, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Subscriptions(tx))?;
        rx.await.map_err(|_| SyncError::TransportFailure("channel driver stopped".into()))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until the state satisfies `pred`.
    pub async fn wait_for<F>(&self, pred: F) -> Result<ConnectionState, SyncError>
    where
        F: FnMut(&ConnectionState) -> bool,
    {
        let mut rx = self.state_rx.clone();
        let state = rx
            .wait_for(pred)
            .await
            .map_err(|_| SyncError::TransportFailure("channel driver stopped".into()))?;
        Ok(*state)
    }

    /// Disconnect and stop the driver task.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

pub struct ChannelDriver;

impl ChannelDriver {
    /// Move `manager` into its own task. `events` is the receiver returned by
    /// [`ConnectionManager::new`].
    pub fn spawn<C>(manager: ConnectionManager<C>, events: EventReceiver) -> (ChannelHandle, JoinHandle<()>)
    where
        C: Connector + 'static,
        C::Link: 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let state_rx = manager.watch_state();
        let task = tokio::spawn(drive(manager, events, cmd_rx));
        (ChannelHandle { cmd_tx, state_rx }, task)
    }
}

async fn drive<C: Connector>(
    mut manager: ConnectionManager<C>,
    mut events: EventReceiver,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    info!("[driver] started");
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Shutdown) | None => break,
                Some(cmd) => apply(&mut manager, cmd),
            },
            Some(event) = events.recv() => manager.handle_event(event),
        }
    }
    manager.disconnect();
    info!("[driver] stopped");
}

fn apply<C: Connector>(manager: &mut ConnectionManager<C>, cmd: Command) {
    debug!("[driver] {cmd:?}");
    match cmd {
        Command::Connect => manager.connect(),
        Command::Disconnect => manager.disconnect(),
        Command::Subscribe(symbols) => manager.subscribe(&symbols),
        Command::Unsubscribe(symbols) => manager.unsubscribe(&symbols),
        Command::ClearSubscriptions => manager.clear_subscriptions(),
        Command::BindHandler(tag, handler) => {
            manager.bind_handler(tag, handler);
        }
        Command::OnStateChange(observer) => manager.on_state_change(observer),
        Command::Stats(reply) => {
            let _ = reply.send(manager.stats());
        }
        Command::Subscriptions(reply) => {
            let _ = reply.send(manager.subscriptions().symbols());
        }
        Command::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryConnector;
    use au_core::config::ChannelConfig;
    use au_core::ws::LinkEvent;

    fn spawn(conn: &MemoryConnector) -> (ChannelHandle, JoinHandle<()>) {
        let config = ChannelConfig { default_symbols: vec!["AU9999".into()], ..ChannelConfig::default() };
        let (manager, events) = ConnectionManager::new(&config, conn.clone());
        ChannelDriver::spawn(manager, events)
    }

    #[tokio::test]
    async fn handle_drives_connect_and_subscribe() {
        let conn = MemoryConnector::new();
        let (handle, task) = spawn(&conn);

        handle.connect().unwrap();
        handle.wait_for(|s| *s == ConnectionState::Connecting).await.unwrap();
        conn.emit(LinkEvent::Opened);
        handle.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();

        handle.subscribe(&["XAU/USD"]).unwrap();
        assert_eq!(handle.subscriptions().await.unwrap(), vec!["AU9999", "XAU/USD"]);
        let subs: Vec<_> = conn.sent_frames().into_iter().filter(|f| f["type"] == "subscribe").collect();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1]["data"]["symbols"], serde_json::json!(["AU9999", "XAU/USD"]));

        handle.shutdown();
        task.await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert!(handle.connect().is_err());
    }

    #[tokio::test]
    async fn stats_count_dispatched_frames() {
        let conn = MemoryConnector::new();
        let (handle, _task) = spawn(&conn);
        handle.connect().unwrap();
        handle.wait_for(|s| *s == ConnectionState::Connecting).await.unwrap();
        conn.emit(LinkEvent::Opened);
        conn.emit(LinkEvent::Text(r#"{"type":"heartbeat","data":{}}"#.into()));
        conn.emit(LinkEvent::Text("garbage".into()));
        handle.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();

        // Stats is queued behind the events above only once they have been read.
        let stats = loop {
            let s = handle.stats().await.unwrap();
            if s.message_count > 0 {
                break s;
            }
            tokio::task::yield_now().await;
        };
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.state, ConnectionState::Connected);
    }
}
