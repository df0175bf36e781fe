//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] opens a [`WebSocketSession`] whose background pump
//! owns the socket. Events travel as JSON text frames of the form
//! `{"event": "volumeChanged", "args": [42]}`. Both `ws://` and `wss://`
//! endpoints are supported; `http(s)` server URLs are mapped to them by
//! [`TransportConfig::endpoint`].
//!
//! Like a socket.io client, a session heals on its own: when the link drops
//! the pump reports [`SessionEvent::Disconnected`], waits the configured
//! reconnection delay and dials again until the session is closed or dropped.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is enabled
//! (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), playback_remote::RemoteError> {
//! use playback_remote::transport::{Connector, Session, SessionEvent, TransportConfig};
//! use playback_remote::WebSocketConnector;
//!
//! let config = TransportConfig {
//!     url: "http://localhost:3000/".into(),
//!     ..TransportConfig::default()
//! };
//! let mut session = WebSocketConnector::new().open(&config)?;
//! session.on("volumeChanged");
//!
//! while let Some(event) = session.recv().await {
//!     if event == SessionEvent::Connected {
//!         session.emit("getVolume", Vec::new()).await?;
//!     }
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::protocol::EventFrame;
use crate::transport::{Connector, Session, SessionEvent, TransportConfig};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Connector`] that opens WebSocket sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    /// Spawn a session pump for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Init`] if the URL scheme is not one of
    /// `http`, `https`, `ws` or `wss`, or if no tokio runtime is available.
    fn open(&self, config: &TransportConfig) -> Result<Box<dyn Session>, RemoteError> {
        let endpoint = config.endpoint();
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(RemoteError::Init(format!(
                "unsupported server url `{}`",
                config.url
            )));
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| RemoteError::Init(e.to_string()))?;

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stop = Arc::new(Notify::new());

        let pump = Pump {
            endpoint,
            connect_timeout: config.connect_timeout,
            reconnection_delay: config.reconnection_delay,
            outgoing: outgoing_rx,
            events: events_tx,
            stop: Arc::clone(&stop),
        };

        Ok(Box::new(WebSocketSession {
            outgoing: Some(outgoing_tx),
            events: events_rx,
            interests: HashSet::new(),
            stop,
            pump: Some(runtime.spawn(pump.run())),
        }))
    }
}

/// A [`Session`] backed by a self-reconnecting WebSocket pump.
///
/// # Cancel Safety
///
/// [`recv`](Session::recv) reads from an mpsc channel and is cancel-safe.
/// Events emitted while the link is down are queued and flushed once a
/// connection is established.
#[derive(Debug)]
pub struct WebSocketSession {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    interests: HashSet<String>,
    stop: Arc<Notify>,
    pump: Option<JoinHandle<()>>,
}

#[async_trait]
impl Session for WebSocketSession {
    fn on(&mut self, event: &str) {
        self.interests.insert(event.to_string());
    }

    async fn emit(&mut self, event: &str, args: Vec<Value>) -> Result<(), RemoteError> {
        let Some(outgoing) = &self.outgoing else {
            return Err(RemoteError::TransportClosed);
        };
        let text = serde_json::to_string(&EventFrame::new(event, args))?;
        outgoing
            .send(text)
            .map_err(|_| RemoteError::TransportClosed)
    }

    async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.events.recv().await? {
                SessionEvent::Message { event, .. } if !self.interests.contains(&event) => {
                    debug!(event = %event, "skipping unsubscribed event");
                }
                event => return Some(event),
            }
        }
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        if self.outgoing.take().is_none() {
            return Ok(());
        }
        self.stop.notify_one();
        if let Some(pump) = self.pump.as_mut() {
            let joined = pump.await;
            self.pump = None;
            joined.map_err(|e| RemoteError::TransportReceive(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

// ── Pump ────────────────────────────────────────────────────────────

enum LinkEnd {
    /// The session asked the pump to stop, or went away.
    Stopped,
    /// The link dropped; the pump should dial again.
    Lost(Option<String>),
}

struct Pump {
    endpoint: String,
    connect_timeout: Duration,
    reconnection_delay: Duration,
    outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SessionEvent>,
    stop: Arc<Notify>,
}

impl Pump {
    async fn run(mut self) {
        loop {
            debug!(endpoint = %self.endpoint, "connecting to WebSocket server");
            let attempt = tokio::time::timeout(
                self.connect_timeout,
                tokio_tungstenite::connect_async(self.endpoint.as_str()),
            );

            let outcome = tokio::select! {
                () = self.stop.notified() => return,
                outcome = attempt => outcome,
            };

            let end = match outcome {
                Ok(Ok((stream, _response))) => {
                    info!(endpoint = %self.endpoint, "WebSocket connection established");
                    if !self.report(SessionEvent::Connected) {
                        return;
                    }
                    match self.pump_frames(stream).await {
                        LinkEnd::Stopped => return,
                        LinkEnd::Lost(reason) => SessionEvent::Disconnected { reason },
                    }
                }
                Ok(Err(e)) => {
                    let kind = match &e {
                        tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                        _ => std::io::ErrorKind::Other,
                    };
                    SessionEvent::ConnectError(
                        RemoteError::Io(std::io::Error::new(kind, e)).to_string(),
                    )
                }
                Err(_) => SessionEvent::ConnectError(RemoteError::Timeout.to_string()),
            };

            debug!(event = ?end, "WebSocket link down");
            if !self.report(end) {
                return;
            }

            tokio::select! {
                () = self.stop.notified() => return,
                () = tokio::time::sleep(self.reconnection_delay) => {}
            }
        }
    }

    async fn pump_frames(&mut self, stream: WsStream) -> LinkEnd {
        let (mut sink, mut source) = stream.split();
        loop {
            tokio::select! {
                () = self.stop.notified() => {
                    close_quietly(&mut sink).await;
                    return LinkEnd::Stopped;
                }

                out = self.outgoing.recv() => match out {
                    Some(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            return LinkEnd::Lost(Some(e.to_string()));
                        }
                    }
                    None => {
                        close_quietly(&mut sink).await;
                        return LinkEnd::Stopped;
                    }
                },

                frame = source.next() => {
                    if let Some(end) = self.handle_frame(frame) {
                        return end;
                    }
                }
            }
        }
    }

    /// Returns `Some` when the link is over.
    fn handle_frame(
        &self,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> Option<LinkEnd> {
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return Some(LinkEnd::Lost(Some(e.to_string()))),
            None => return Some(LinkEnd::Lost(None)),
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<EventFrame>(text.as_str()) {
                Ok(frame) => {
                    let delivered = self.report(SessionEvent::Message {
                        event: frame.event,
                        args: frame.args,
                    });
                    if !delivered {
                        return Some(LinkEnd::Stopped);
                    }
                }
                Err(e) => warn!("skipping malformed event frame: {e}"),
            },
            Message::Close(frame) => {
                debug!(?frame, "received WebSocket close frame");
                return Some(LinkEnd::Lost(frame.map(|f| f.reason.to_string())));
            }
            Message::Ping(_) | Message::Pong(_) => {
                // tungstenite answers pings itself.
            }
            Message::Binary(_) => warn!("received unexpected binary WebSocket frame, skipping"),
            Message::Frame(_) => debug!("received raw WebSocket frame, skipping"),
        }
        None
    }

    /// Forward an event to the session. Returns `false` once the session is gone.
    fn report(&self, event: SessionEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

async fn close_quietly(sink: &mut SplitSink<WsStream, Message>) {
    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!("close frame not delivered: {e}");
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    #[test]
    fn websocket_session_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketSession>();
    }

    #[tokio::test]
    async fn open_rejects_unknown_scheme() {
        let config = TransportConfig {
            url: "ftp://example.com/".into(),
            ..TransportConfig::default()
        };
        let err = WebSocketConnector::new().open(&config).err().unwrap();
        assert!(matches!(err, RemoteError::Init(_)));
    }

    #[test]
    fn open_outside_runtime_is_an_init_error() {
        let err = WebSocketConnector::new()
            .open(&TransportConfig::default())
            .err().unwrap();
        assert!(matches!(err, RemoteError::Init(_)));
    }

    // ── Mock-server helpers ─────────────────────────────────────────

    /// Start a local WebSocket server that runs `handler` on the first
    /// accepted connection and returns a config pointing at it.
    async fn start_mock_server<F, Fut>(handler: F) -> TransportConfig
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        TransportConfig {
            url: format!("http://{addr}"),
            path: "/api/socket".into(),
            connect_timeout: Duration::from_secs(5),
            reconnection_delay: Duration::from_secs(60),
        }
    }

    fn frame(event: &str, args: Vec<Value>) -> Message {
        Message::Text(serde_json::to_string(&EventFrame::new(event, args)).unwrap().into())
    }

    // ── Mock-server tests ───────────────────────────────────────────

    #[tokio::test]
    async fn reports_connected_then_subscribed_events_only() {
        let config = start_mock_server(|mut ws| async move {
            ws.send(frame("stateChanged", vec![json!(1)])).await.unwrap();
            ws.send(frame("volumeChanged", vec![json!(80)])).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut session = WebSocketConnector::new().open(&config).unwrap();
        session.on("volumeChanged");

        assert_eq!(session.recv().await, Some(SessionEvent::Connected));
        assert_eq!(
            session.recv().await,
            Some(SessionEvent::Message {
                event: "volumeChanged".into(),
                args: vec![json!(80)],
            })
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_and_binary_frames_are_skipped() {
        let config = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(frame("ping", Vec::new())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut session = WebSocketConnector::new().open(&config).unwrap();
        session.on("ping");

        assert_eq!(session.recv().await, Some(SessionEvent::Connected));
        assert_eq!(
            session.recv().await,
            Some(SessionEvent::Message {
                event: "ping".into(),
                args: Vec::new(),
            })
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn emit_sends_event_frame() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let config = start_mock_server(move |mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                seen_tx.send(text.to_string()).unwrap();
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut session = WebSocketConnector::new().open(&config).unwrap();
        // Queued before the link is up; flushed on connect.
        session
            .emit("changeSong", vec![json!("slow"), json!("fast")])
            .await
            .unwrap();

        let text = seen_rx.recv().await.unwrap();
        let parsed: EventFrame = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.event, "changeSong");
        assert_eq!(parsed.args, vec![json!("slow"), json!("fast")]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn server_close_reports_disconnected() {
        let config = start_mock_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut session = WebSocketConnector::new().open(&config).unwrap();
        assert_eq!(session.recv().await, Some(SessionEvent::Connected));
        assert!(matches!(
            session.recv().await,
            Some(SessionEvent::Disconnected { .. })
        ));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_host_reports_connect_error() {
        let config = TransportConfig {
            url: "ws://127.0.0.1:1".into(),
            path: String::new(),
            connect_timeout: Duration::from_secs(5),
            reconnection_delay: Duration::from_secs(60),
        };
        let mut session = WebSocketConnector::new().open(&config).unwrap();
        assert!(matches!(
            session.recv().await,
            Some(SessionEvent::ConnectError(_))
        ));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn connect_timeout_reports_connect_error() {
        // Non-routable address guarantees the attempt hangs.
        let config = TransportConfig {
            url: "ws://192.0.2.1:1".into(),
            path: String::new(),
            connect_timeout: Duration::from_millis(50),
            reconnection_delay: Duration::from_secs(60),
        };
        let mut session = WebSocketConnector::new().open(&config).unwrap();
        assert_eq!(
            session.recv().await,
            Some(SessionEvent::ConnectError(RemoteError::Timeout.to_string()))
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn emit_after_close_returns_transport_closed() {
        let config =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut session = WebSocketConnector::new().open(&config).unwrap();
        assert_eq!(session.recv().await, Some(SessionEvent::Connected));
        session.close().await.unwrap();
        // Second close is a no-op.
        session.close().await.unwrap();

        let err = session.emit("getVolume", Vec::new()).await.unwrap_err();
        assert!(matches!(err, RemoteError::TransportClosed));
    }
}
