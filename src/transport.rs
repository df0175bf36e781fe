//! Transport abstraction for the playback-control event protocol.
//!
//! The client never speaks a wire protocol itself. It relies on two traits:
//!
//! - [`Connector`] builds a new [`Session`] from a [`TransportConfig`]. This is
//!   the "automatic connect" call: it returns immediately and the session
//!   reports the outcome of its connection attempt later through
//!   [`Session::recv`].
//! - [`Session`] is one transport instance with named-event publish/subscribe
//!   semantics. A session may drop and re-establish its link on its own; every
//!   such change surfaces as a [`SessionEvent`]. Each call to
//!   [`RemoteClient::reconnect`](crate::RemoteClient::reconnect) discards the
//!   whole session and asks the connector for a fresh one.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use playback_remote::error::RemoteError;
//! use playback_remote::transport::{Connector, Session, SessionEvent, TransportConfig};
//! use serde_json::Value;
//!
//! struct MySession { /* ... */ }
//!
//! #[async_trait]
//! impl Session for MySession {
//!     fn on(&mut self, event: &str) {
//!         // Start delivering `event` through `recv`
//!     }
//!
//!     async fn emit(&mut self, event: &str, args: Vec<Value>) -> Result<(), RemoteError> {
//!         // Publish the event to the server
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<SessionEvent> {
//!         // Next lifecycle or subscribed event; None once the session is over
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), RemoteError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! impl Connector for MyConnector {
//!     fn open(&self, config: &TransportConfig) -> Result<Box<dyn Session>, RemoteError> {
//!         Ok(Box::new(MySession { /* ... */ }))
//!     }
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;

/// Default server address of the playback controller.
pub const DEFAULT_SERVER_URL: &str = "http://192.168.0.4:3000/";
/// Default request path of the event endpoint.
pub const DEFAULT_PATH: &str = "/api/socket";
/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(45_000);
/// Default pause between automatic reconnection attempts inside a session.
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_secs(1);

/// Something that happened on a [`Session`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The link is established (initially or after healing).
    Connected,
    /// A connection attempt failed. The detail is empty when the transport
    /// has nothing to say.
    ConnectError(String),
    /// An established link dropped.
    Disconnected {
        /// Reason given by the transport, if any.
        reason: Option<String>,
    },
    /// A subscribed event arrived from the server.
    Message {
        /// Event name.
        event: String,
        /// Positional arguments.
        args: Vec<Value>,
    },
}

/// Connection parameters handed to a [`Connector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Server base URL (`http`, `https`, `ws` or `wss`).
    pub url: String,
    /// Request path appended to the URL.
    pub path: String,
    /// Upper bound on a single connection attempt.
    pub connect_timeout: Duration,
    /// Pause between automatic reconnection attempts.
    pub reconnection_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            path: DEFAULT_PATH.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
        }
    }
}

impl TransportConfig {
    /// WebSocket endpoint for this configuration.
    ///
    /// `http` becomes `ws` and `https` becomes `wss`; the path is joined with
    /// exactly one slash.
    ///
    /// ```
    /// use playback_remote::transport::TransportConfig;
    ///
    /// let config = TransportConfig::default();
    /// assert_eq!(config.endpoint(), "ws://192.168.0.4:3000/api/socket");
    /// ```
    pub fn endpoint(&self) -> String {
        let url = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.url.clone()
        };
        let base = url.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }
}

/// One transport session with named-event publish/subscribe semantics.
///
/// # Cancel Safety
///
/// [`recv`](Session::recv) **MUST** be cancel-safe because the connection task
/// polls it inside `tokio::select!`. Channel-backed implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Session: Send + 'static {
    /// Register interest in `event`; matching server events are then yielded
    /// by [`recv`](Session::recv) as [`SessionEvent::Message`].
    ///
    /// The connection task guarantees it calls this at most once per event
    /// name on a given session.
    fn on(&mut self, event: &str);

    /// Publish an event to the server.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::TransportSend`] or [`RemoteError::TransportClosed`]
    /// if the event could not be queued.
    async fn emit(&mut self, event: &str, args: Vec<Value>) -> Result<(), RemoteError>;

    /// Receive the next lifecycle or subscribed event.
    ///
    /// Returns `None` once the session has ended for good and will produce no
    /// more events.
    async fn recv(&mut self) -> Option<SessionEvent>;

    /// Tear the session down. After this returns the session must not deliver
    /// further events or reconnect on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful close fails. Implementations should
    /// still release their resources.
    async fn close(&mut self) -> Result<(), RemoteError>;
}

/// Factory for transport sessions.
pub trait Connector: Send + Sync + 'static {
    /// Construct a session and start connecting it.
    ///
    /// This must not block on the network: connection success or failure is
    /// reported through the returned session.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport cannot even be constructed (bad
    /// URL, invalid options). The client maps this to
    /// [`ConnectionStatus::Error`](crate::ConnectionStatus::Error).
    fn open(&self, config: &TransportConfig) -> Result<Box<dyn Session>, RemoteError>;
}
