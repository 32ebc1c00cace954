//! WebSocket link over `tokio-tungstenite`.
//!
//! Each [`WsLink`] runs as a tokio task that:
//! 1. Performs the handshake (TLS for `wss://`).
//! 2. Reports `Opened`, then forwards every text frame to the callback.
//! 3. Writes queued outbound frames and answers protocol-level pings.
//! 4. Reports exactly one terminal event on failure or remote close.
//!
//! Reconnection is not handled here; the channel's connection manager opens a
//! fresh link for every attempt.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tracing::{debug, info, warn};

use super::{Connector, Link, LinkEvent, OnLinkEvent};
use crate::error::SyncError;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens [`WsLink`]s. Must be used from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(extra_headers: HashMap<String, String>) -> Self {
        Self { extra_headers }
    }
}

impl Connector for WsConnector {
    type Link = WsLink;

    fn open(&mut self, url: &str, on_event: OnLinkEvent) -> Result<WsLink, SyncError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SyncError::TransportFailure(format!("invalid url {url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(SyncError::TransportFailure(format!("unsupported scheme in {url}")));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let url = url.to_string();
        let headers = self.extra_headers.clone();

        let task = tokio::spawn(async move {
            link_loop(url, headers, on_event, outbound_rx, shutdown_rx).await;
        });

        Ok(WsLink { outbound_tx, shutdown_tx: Some(shutdown_tx), task: Some(task) })
    }
}

/// A single WebSocket connection managed by a background tokio task.
///
/// Dropping the link closes the connection.
pub struct WsLink {
    /// Outbound text frames.
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Task join handle.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Link for WsLink {
    fn send(&self, text: String) -> Result<(), SyncError> {
        self.outbound_tx
            .send(text)
            .map_err(|_| SyncError::TransportFailure("link task has exited".into()))
    }

    fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        // The task finishes the close handshake on its own.
        self.task.take();
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connect, then pump frames in both directions until failure, remote close,
/// or shutdown.
async fn link_loop(
    url: String,
    headers: HashMap<String, String>,
    on_event: OnLinkEvent,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("[ws] connecting to {url}");

    let ws_stream = tokio::select! {
        res = connect_ws(&url, &headers) => match res {
            Ok(s) => s,
            Err(e) => {
                warn!("[ws] connection to {url} failed: {e}");
                on_event(LinkEvent::Error(e.to_string()));
                return;
            }
        },
        _ = shutdown_rx.changed() => {
            debug!("[ws] closed before handshake completed");
            return;
        }
    };

    info!("[ws] connected to {url}");
    on_event(LinkEvent::Opened);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("[ws] shutdown signal received");
                let _ = ws_write.close().await;
                return;
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        on_event(LinkEvent::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => on_event(LinkEvent::Text(text)),
                        Err(_) => warn!("[ws] dropped non-UTF-8 binary frame ({} bytes)", data.len()),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map(|f| f.reason.as_str().to_owned());
                        warn!("[ws] received close frame: {reason:?}");
                        on_event(LinkEvent::Closed(reason));
                        return;
                    }
                    Some(Err(e)) => {
                        warn!("[ws] read error: {e}");
                        on_event(LinkEvent::Error(e.to_string()));
                        return;
                    }
                    None => {
                        warn!("[ws] stream ended");
                        on_event(LinkEvent::Closed(None));
                        return;
                    }
                    _ => {} // Pong, Frame
                }
            }

            Some(text) = outbound_rx.recv() => {
                if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                    warn!("[ws] send error: {e}");
                    on_event(LinkEvent::Error(e.to_string()));
                    return;
                }
            }
        }
    }
}

/// Perform the WebSocket handshake with any extra headers applied.
async fn connect_ws(url: &str, headers: &HashMap<String, String>) -> Result<WsStream, SyncError> {
    let transport = |e: &dyn std::fmt::Display| SyncError::TransportFailure(e.to_string());

    let mut request = url.into_client_request().map_err(|e| transport(&e))?;
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| transport(&e))?;
        let value = HeaderValue::from_str(value).map_err(|e| transport(&e))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, _response) =
        tokio_tungstenite::connect_async(request).await.map_err(|e| transport(&e))?;
    Ok(stream)
}
