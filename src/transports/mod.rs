//! Transport implementations for the playback-control event protocol.
//!
//! This module provides concrete [`Connector`](crate::transport::Connector)
//! implementations behind feature gates. Enable the corresponding Cargo
//! feature to pull in a transport:
//!
//! | Feature                | Connector              |
//! |------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketConnector`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketSession};
