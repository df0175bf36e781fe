//! # Playback Remote
//!
//! Async remote-control client for a media playback server, with a
//! self-healing connection lifecycle.
//!
//! The server pushes playback state (volume, play/stop, mute, current song)
//! as named events and accepts named commands. This crate keeps the link to
//! it alive: transient drops get a short grace period before they are
//! reported, half-open links are caught by a heartbeat, listeners survive
//! reconnects without duplicating, and the full state is re-requested after
//! every (re)connection.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Connector`] and [`Session`] for any backend
//! - **WebSocket built-in**: default `transport-websocket` feature provides [`WebSocketConnector`]
//! - **Observable status**: [`ConnectionStatus`] published on a `tokio::sync::watch` channel
//! - **Typed payloads**: inbound events decode through [`ServerEvent::decode`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), playback_remote::RemoteError> {
//! use playback_remote::{RemoteClient, RemoteConfig, RemoteControl, WebSocketConnector};
//!
//! let client = RemoteClient::new(
//!     WebSocketConnector::new(),
//!     RemoteConfig::new("http://192.168.0.4:3000/"),
//! );
//! let mut remote = RemoteControl::new(client)?;
//! remote.start()?;
//!
//! let mut status = remote.watch_status();
//! status.wait_for(|s| s.is_connected()).await.ok();
//! remote.change_volume(70)?;
//! println!("song: {}", remote.mirror().current_song());
//!
//! remote.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod heartbeat;
pub mod hydrate;
pub mod machine;
pub mod mirror;
pub mod protocol;
pub mod registry;
pub mod remote;
pub mod status;
pub(crate) mod timer;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{RemoteClient, RemoteConfig};
pub use error::{DecodeError, RemoteError};
pub use mirror::PlaybackMirror;
pub use protocol::{ClientCommand, EventFrame, ServerEvent};
pub use remote::{ProcessingWindow, ReconnectThrottle, RemoteControl};
pub use status::ConnectionStatus;
pub use transport::{Connector, Session, SessionEvent, TransportConfig};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketSession};
