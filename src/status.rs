//! The canonical connection status observed by UI consumers.

use std::fmt;

use tokio::time::Instant;

/// Connectivity as seen by the client.
///
/// Exactly one variant is active at a time. The status is published through a
/// [`tokio::sync::watch`] channel written only by the connection task, so every
/// observer reads a single, consistent value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A session is established and the server is considered alive.
    Connected,
    /// A session is being opened and has not reported success yet.
    Connecting,
    /// The link was lost at `since`; the transport still has the grace window
    /// to heal before the loss is reported as [`Disconnected`](Self::Disconnected).
    GracePeriod {
        /// When the loss was detected.
        since: Instant,
    },
    /// No usable connection.
    Disconnected,
    /// The last attempt failed with a diagnostic.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl ConnectionStatus {
    /// Returns `true` for [`Connected`](Self::Connected).
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` for [`GracePeriod`](Self::GracePeriod).
    pub fn is_grace_period(&self) -> bool {
        matches!(self, Self::GracePeriod { .. })
    }

    /// Whether the UI should block input with a connection overlay.
    ///
    /// `Connecting` and `GracePeriod` still count as usable.
    pub fn blocks_interaction(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error { .. })
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Connecting => f.write_str("connecting"),
            Self::GracePeriod { since } => {
                write!(f, "reconnecting ({:.1}s)", since.elapsed().as_secs_f32())
            }
            Self::Disconnected => f.write_str("disconnected"),
            Self::Error { message } => write!(f, "error: {message}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn only_hard_failures_block_interaction() {
        assert!(!ConnectionStatus::Connected.blocks_interaction());
        assert!(!ConnectionStatus::Connecting.blocks_interaction());
        assert!(!ConnectionStatus::GracePeriod {
            since: Instant::now()
        }
        .blocks_interaction());
        assert!(ConnectionStatus::Disconnected.blocks_interaction());
        assert!(ConnectionStatus::Error {
            message: "boom".into()
        }
        .blocks_interaction());
    }

    #[test]
    fn display_includes_error_message() {
        let status = ConnectionStatus::Error {
            message: "refused".into(),
        };
        assert_eq!(status.to_string(), "error: refused");
        assert_eq!(ConnectionStatus::Connecting.to_string(), "connecting");
    }
}
